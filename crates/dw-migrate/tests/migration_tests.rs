//! End-to-end migration tests.
//!
//! These drive [`Migrator`] through a real [`WarehouseSource`] backed by an
//! in-memory session, into an in-memory destination that records every
//! call it receives.

use std::sync::{Arc, Mutex};

use arrow::array::{Array, Int64Array, StringArray, TimestampMicrosecondArray};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use dw_migrate::source::QueryRows;
use dw_migrate::{
    ColumnDescriptor, Config, Destination, DestinationColumn, DestinationKind, LoadBatch,
    MigrateError, MigrationPhase, Migrator, Result, SqlValue, WarehouseSession, WarehouseSource,
    WriteMode,
};

// =============================================================================
// Test doubles
// =============================================================================

/// Partitioned `orders` table: `id bigint, status string, pt string (partition)`.
struct OrdersSession {
    rows: Vec<Vec<SqlValue>>,
}

impl OrdersSession {
    fn new(rows: Vec<[&str; 2]>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|[id, status]| vec![id.into(), status.into(), "20240101".into()])
                .collect(),
        }
    }

    /// Five rows, `status` of the second one is a literal NULL.
    fn sample() -> Self {
        Self::new(vec![
            ["7", "007"],
            ["8", "NULL"],
            ["9", "010"],
            ["10", "abc"],
            ["11", "x"],
        ])
    }
}

#[async_trait]
impl WarehouseSession for OrdersSession {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn describe_table(&self, _table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(vec![
            ColumnDescriptor::new("id", "bigint"),
            ColumnDescriptor::new("status", "string"),
            ColumnDescriptor::partition("pt", "string"),
        ])
    }

    async fn query(&self, sql: &str) -> Result<QueryRows> {
        if sql.starts_with("SELECT MAX") {
            return Ok(QueryRows {
                columns: vec!["max_pt".into()],
                rows: stream::iter(vec![Ok(vec![SqlValue::from("20240101")])]).boxed(),
            });
        }
        Ok(QueryRows {
            columns: vec!["id".into(), "status".into(), "pt".into()],
            rows: stream::iter(self.rows.clone().into_iter().map(Ok)).boxed(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    TableExists,
    Create(Vec<DestinationColumn>),
    Truncate,
    Delete,
    Write(WriteMode, usize),
}

#[derive(Default)]
struct State {
    table: Option<Vec<DestinationColumn>>,
    calls: Vec<Call>,
    batches: Vec<LoadBatch>,
}

/// Destination of either kind that keeps everything in memory.
struct MemoryDestination {
    kind: DestinationKind,
    state: Mutex<State>,
}

impl MemoryDestination {
    fn new(kind: DestinationKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            state: Mutex::new(State::default()),
        })
    }

    fn with_table(kind: DestinationKind, columns: Vec<DestinationColumn>) -> Arc<Self> {
        let dest = Self::new(kind);
        dest.state.lock().unwrap().table = Some(columns);
        dest
    }

    fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    fn batches(&self) -> Vec<LoadBatch> {
        self.state.lock().unwrap().batches.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn kind(&self) -> DestinationKind {
        self.kind
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn scope(&self) -> &str {
        "dw"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn table_exists(&self, _scope: &str, _table: &str) -> Result<bool> {
        self.record(Call::TableExists);
        Ok(self.state.lock().unwrap().table.is_some())
    }

    async fn create_table(
        &self,
        _table: &str,
        columns: &[DestinationColumn],
        _mode: WriteMode,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(columns.to_vec()));
        state.table = Some(columns.to_vec());
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        if self.kind == DestinationKind::Analytical {
            return Err(MigrateError::Unsupported(format!("truncate_table({})", table)));
        }
        self.record(Call::Truncate);
        Ok(())
    }

    async fn delete_table(&self, scope: &str, table: &str) -> Result<()> {
        if self.kind == DestinationKind::Relational {
            return Err(MigrateError::Unsupported(format!("delete_table({}.{})", scope, table)));
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete);
        state.table = None;
        Ok(())
    }

    async fn get_table_schema(&self, table: &str) -> Result<Vec<DestinationColumn>> {
        self.state
            .lock()
            .unwrap()
            .table
            .clone()
            .ok_or_else(|| MigrateError::migration(table, "no such table"))
    }

    async fn write_batch(&self, _table: &str, batch: LoadBatch, mode: WriteMode) -> Result<u64> {
        let rows = batch.num_rows();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Write(mode, rows));
        state.batches.push(batch);
        Ok(rows as u64)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn config(destination: &str, extra: &str) -> Config {
    let dest_block = match destination {
        "mysql" => "destination:\n  type: mysql\n  mysql:\n    host: localhost\n    user: loader\n    database: dw\n",
        _ => "destination:\n  type: bigquery\n  project: p\n  dataset: dw\n",
    };
    let yaml = format!(
        "source:\n  project: src\n  table: orders\n{}run:\n  batch_size: 2\n{}",
        dest_block, extra
    );
    Config::from_yaml(&yaml).unwrap()
}

fn migrator(config: Config, session: OrdersSession, dest: &Arc<MemoryDestination>) -> Migrator {
    let source = Arc::new(WarehouseSource::new(session, "memory://warehouse"));
    Migrator::new(config, source, dest.clone()).unwrap()
}

fn writes(calls: &[Call]) -> Vec<(WriteMode, usize)> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Write(mode, n) => Some((*mode, *n)),
            _ => None,
        })
        .collect()
}

fn columnar(batch: &LoadBatch) -> &arrow::record_batch::RecordBatch {
    match batch {
        LoadBatch::Columnar(b) => b,
        LoadBatch::Rows(_) => panic!("expected a columnar batch"),
    }
}

// =============================================================================
// Write disposition
// =============================================================================

#[tokio::test]
async fn test_relational_overwrite_truncates_and_never_drops() {
    let dest = MemoryDestination::with_table(
        DestinationKind::Relational,
        vec![
            DestinationColumn::new("id", "bigint"),
            DestinationColumn::new("status", "text"),
        ],
    );
    let mut m = migrator(config("mysql", "  mode: overwrite\n"), OrdersSession::sample(), &dest);

    let result = m.migrate().await.unwrap();
    assert_eq!(result.status, "completed");
    assert_eq!(result.total_rows, 5);

    let calls = dest.calls();
    assert!(calls.contains(&Call::Truncate));
    assert!(!calls.contains(&Call::Delete));
    assert!(!calls.iter().any(|c| matches!(c, Call::Create(_))));
}

#[tokio::test]
async fn test_relational_overwrite_truncates_exactly_once() {
    let dest = MemoryDestination::with_table(
        DestinationKind::Relational,
        vec![
            DestinationColumn::new("id", "bigint"),
            DestinationColumn::new("status", "text"),
        ],
    );
    let mut m = migrator(config("mysql", "  mode: overwrite\n"), OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let calls = dest.calls();
    assert_eq!(calls.iter().filter(|c| **c == Call::Truncate).count(), 1);
    assert_eq!(
        writes(&calls),
        vec![
            (WriteMode::Append, 2),
            (WriteMode::Append, 2),
            (WriteMode::Append, 1),
        ]
    );
}

#[tokio::test]
async fn test_analytical_overwrite_drops_and_recreates() {
    let dest = MemoryDestination::with_table(
        DestinationKind::Analytical,
        vec![DestinationColumn::new("legacy", "STRING")],
    );
    let mut m = migrator(config("bigquery", "  mode: overwrite\n"), OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let calls = dest.calls();
    let delete = calls.iter().position(|c| *c == Call::Delete).unwrap();
    let create = calls
        .iter()
        .position(|c| matches!(c, Call::Create(_)))
        .unwrap();
    assert!(delete < create);
    assert!(!calls.contains(&Call::Truncate));

    let Call::Create(columns) = &calls[create] else {
        unreachable!()
    };
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "status"]);
}

#[tokio::test]
async fn test_overwrite_first_batch_truncates_rest_append() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let mut m = migrator(config("bigquery", "  mode: overwrite\n"), OrdersSession::sample(), &dest);
    let result = m.migrate().await.unwrap();

    assert_eq!(result.total_batches, 3);
    assert_eq!(
        writes(&dest.calls()),
        vec![
            (WriteMode::Truncate, 2),
            (WriteMode::Append, 2),
            (WriteMode::Append, 1),
        ]
    );
}

#[tokio::test]
async fn test_append_to_missing_table_creates_it() {
    let dest = MemoryDestination::new(DestinationKind::Relational);
    let mut m = migrator(config("mysql", ""), OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let calls = dest.calls();
    assert!(matches!(calls[1], Call::Create(_)));
    assert!(writes(&calls).iter().all(|(mode, _)| *mode == WriteMode::Append));
}

// =============================================================================
// Coercion and mapping
// =============================================================================

#[tokio::test]
async fn test_round_trip_preserves_rows_and_columns() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let extra = "mappings:\n  default:\n    include: [id, status]\n";
    let mut m = migrator(config("bigquery", extra), OrdersSession::sample(), &dest);
    let result = m.migrate().await.unwrap();
    assert_eq!(result.total_rows, 5);

    let batches = dest.batches();
    let total: usize = batches.iter().map(LoadBatch::num_rows).sum();
    assert_eq!(total, 5);
    for batch in &batches {
        let schema = columnar(batch).schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "status"]);
    }
}

#[tokio::test]
async fn test_declared_types_drive_coercion() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let mut m = migrator(config("bigquery", ""), OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let batches = dest.batches();
    let first = columnar(&batches[0]);
    let ids = first
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(ids.value(0), 7);

    // Digit-only text stays text, leading zeros intact.
    let status = first
        .column_by_name("status")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(status.value(0), "007");
    assert!(first.column_by_name("pt").is_none());
}

#[tokio::test]
async fn test_rename_and_now_identical_across_batch() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let extra = "mappings:\n  tables:\n    - source_table: orders\n      rename: {status: status_code}\n      computed:\n        loaded_at: {func: now}\n";
    let mut cfg = config("bigquery", extra);
    cfg.run.batch_size = Some(10);
    let mut m = migrator(cfg, OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let batches = dest.batches();
    assert_eq!(batches.len(), 1);
    let batch = columnar(&batches[0]);
    let schema = batch.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["id", "status_code", "loaded_at"]);

    let status = batch
        .column_by_name("status_code")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(status.value(0), "007");

    let loaded = batch
        .column_by_name("loaded_at")
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    assert_eq!(loaded.null_count(), 0);
    let first = loaded.value(0);
    assert!((1..loaded.len()).all(|i| loaded.value(i) == first));
}

#[tokio::test]
async fn test_type_override_matches_created_schema() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let extra = "mappings:\n  default:\n    type_override: {id: STRING}\n";
    let mut m = migrator(config("bigquery", extra), OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let calls = dest.calls();
    let Some(Call::Create(columns)) = calls.iter().find(|c| matches!(c, Call::Create(_))) else {
        panic!("table was not created");
    };
    assert_eq!(columns[0].data_type, "STRING");

    let batches = dest.batches();
    let first = columnar(&batches[0]);
    let ids = first
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(ids.value(0), "7");
}

#[tokio::test]
async fn test_computed_column_differing_in_case_written_once() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let extra = "mappings:\n  default:\n    computed:\n      ID: {func: upper, args: [status]}\n";
    let mut m = migrator(config("bigquery", extra), OrdersSession::sample(), &dest);
    m.migrate().await.unwrap();

    let calls = dest.calls();
    let Some(Call::Create(columns)) = calls.iter().find(|c| matches!(c, Call::Create(_))) else {
        panic!("table was not created");
    };
    let created: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(created, vec!["id", "status"]);

    for batch in &dest.batches() {
        let schema = columnar(batch).schema();
        let written: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(written, created);
    }
}

#[tokio::test]
async fn test_duplicate_rename_rejected_before_any_ddl() {
    let dest = MemoryDestination::new(DestinationKind::Relational);
    let extra = "mappings:\n  default:\n    rename: {id: code, status: code}\n";
    let mut m = migrator(config("mysql", extra), OrdersSession::sample(), &dest);

    let err = m.migrate().await.unwrap_err();
    assert!(matches!(err, MigrateError::MappingValidation(_)));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(m.phase(), MigrationPhase::Failed);
    assert!(dest.calls().is_empty());
}

// =============================================================================
// Null policy
// =============================================================================

fn not_null_status_table() -> Arc<MemoryDestination> {
    MemoryDestination::with_table(
        DestinationKind::Relational,
        vec![
            DestinationColumn::new("id", "bigint").not_null(),
            DestinationColumn::new("status_code", "varchar").not_null(),
        ],
    )
}

const RENAME_STATUS: &str = "mappings:\n  default:\n    rename: {status: status_code}\n";

#[tokio::test]
async fn test_skip_policy_drops_violating_rows() {
    let dest = not_null_status_table();
    let extra = format!("compat:\n  null_on_non_nullable: skip\n{}", RENAME_STATUS);
    let mut m = migrator(config("mysql", &extra), OrdersSession::sample(), &dest);

    let result = m.migrate().await.unwrap();
    assert_eq!(result.total_rows, 4);
    assert_eq!(
        writes(&dest.calls()),
        vec![
            (WriteMode::Append, 1),
            (WriteMode::Append, 2),
            (WriteMode::Append, 1),
        ]
    );
}

#[tokio::test]
async fn test_fail_policy_reports_violations() {
    let dest = not_null_status_table();
    let mut m = migrator(config("mysql", RENAME_STATUS), OrdersSession::sample(), &dest);

    let err = m.migrate().await.unwrap_err();
    match &err {
        MigrateError::NonNullableViolation { violations, .. } => {
            assert_eq!(violations, &vec![("status_code".to_string(), 1)]);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(err.exit_code(), 6);
}

#[tokio::test]
async fn test_fill_policy_never_fills_numeric_columns() {
    let dest = not_null_status_table();
    let extra = format!(
        "compat:\n  null_on_non_nullable: fill\n  null_fill_sentinel: \"N/A\"\n{}",
        RENAME_STATUS
    );
    let session = OrdersSession::new(vec![["1", "a"], ["", "b"]]);
    let mut m = migrator(config("mysql", &extra), session, &dest);

    let err = m.migrate().await.unwrap_err();
    assert!(matches!(err, MigrateError::NonNullableViolation { .. }));
    assert!(writes(&dest.calls()).is_empty());
}

#[tokio::test]
async fn test_fill_policy_without_sentinel_fails_on_remaining_nulls() {
    let dest = not_null_status_table();
    let extra = format!("compat:\n  null_on_non_nullable: fill\n{}", RENAME_STATUS);
    let mut m = migrator(config("mysql", &extra), OrdersSession::sample(), &dest);

    let err = m.migrate().await.unwrap_err();
    assert!(matches!(err, MigrateError::NonNullableViolation { .. }));
    assert_eq!(err.exit_code(), 6);
}

#[tokio::test]
async fn test_fill_policy_fills_text_columns() {
    let dest = not_null_status_table();
    let extra = format!(
        "compat:\n  null_on_non_nullable: fill\n  null_fill_sentinel: \"N/A\"\n{}",
        RENAME_STATUS
    );
    let mut m = migrator(config("mysql", &extra), OrdersSession::sample(), &dest);
    let result = m.migrate().await.unwrap();
    assert_eq!(result.total_rows, 5);

    let batches = dest.batches();
    let LoadBatch::Rows(first) = &batches[0] else {
        panic!("expected rows");
    };
    assert_eq!(first.value("status_code", 1), Some(&SqlValue::from("N/A")));
}

// =============================================================================
// Run control
// =============================================================================

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let dest = MemoryDestination::new(DestinationKind::Relational);
    let mut m = migrator(config("mysql", "  dry_run: true\n"), OrdersSession::sample(), &dest);

    let result = m.migrate().await.unwrap();
    assert_eq!(result.status, "dry_run");
    assert_eq!(result.total_rows, 0);
    assert_eq!(m.phase(), MigrationPhase::Done);
    assert_eq!(dest.calls(), vec![Call::TableExists]);
}

#[tokio::test]
async fn test_cancelled_before_first_batch() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let mut m = migrator(config("bigquery", ""), OrdersSession::sample(), &dest);
    m.cancellation_token().cancel();

    let err = m.migrate().await.unwrap_err();
    assert!(matches!(err, MigrateError::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(m.phase(), MigrationPhase::Failed);
    assert!(writes(&dest.calls()).is_empty());
}

#[tokio::test]
async fn test_destination_kind_mismatch_rejected() {
    let dest = MemoryDestination::new(DestinationKind::Analytical);
    let source = Arc::new(WarehouseSource::new(OrdersSession::sample(), "memory://warehouse"));
    let err = Migrator::new(config("mysql", ""), source, dest).err().unwrap();
    assert!(matches!(err, MigrateError::Config(_)));
}

#[tokio::test]
async fn test_health_check_reports_both_endpoints() {
    let dest = MemoryDestination::new(DestinationKind::Relational);
    let m = migrator(config("mysql", ""), OrdersSession::sample(), &dest);
    let health = m.health_check().await;
    assert!(health.healthy);
    assert!(health.source.unwrap().connected);
    assert!(health.destination.unwrap().connected);
}
