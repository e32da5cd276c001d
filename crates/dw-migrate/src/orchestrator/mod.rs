//! Migration orchestrator: drives one table through the state machine.

mod health;
mod phase;
mod plan;

pub use health::{probe_destination, probe_source, EndpointHealth, HealthCheckResult};
pub use phase::MigrationPhase;
pub use plan::{plan_table, TablePlan};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::coerce::{CoercionOptions, TypeCoercer};
use crate::config::{Config, WriteDisposition};
use crate::core::{
    ColumnDescriptor, Destination, DestinationColumn, DestinationKind, LoadBatch, RowBatch,
    SourceReader, TypeMapper, WriteMode,
};
use crate::error::{MigrateError, Result};
use crate::normalize::Normalizer;
use crate::typemap::mapper_for;

/// Result of a single-table migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: `completed` or `dry_run`.
    pub status: String,

    pub source_table: String,
    pub destination_table: String,

    /// Rows written to the destination.
    pub total_rows: u64,

    /// Batches written to the destination.
    pub total_batches: usize,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// Fingerprint of the configuration the run used.
    pub config_hash: String,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchTotals {
    rows: u64,
    batches: usize,
}

/// Warehouse-to-destination migrator.
///
/// One instance per run. Source and destination schemas are cached per
/// table name for the lifetime of the instance and never invalidated.
pub struct Migrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    destination: Arc<dyn Destination>,
    mapper: Box<dyn TypeMapper>,
    coercer: TypeCoercer,
    normalizer: Normalizer,
    source_schemas: HashMap<String, Vec<ColumnDescriptor>>,
    destination_schemas: HashMap<String, Vec<DestinationColumn>>,
    phase: MigrationPhase,
    cancel: CancellationToken,
}

impl Migrator {
    pub fn new(
        config: Config,
        source: Arc<dyn SourceReader>,
        destination: Arc<dyn Destination>,
    ) -> Result<Self> {
        if destination.kind() != config.destination.r#type {
            return Err(MigrateError::Config(format!(
                "destination.type is {} but the destination client is {}",
                config.destination.r#type,
                destination.kind()
            )));
        }

        Ok(Self {
            mapper: mapper_for(destination.kind()),
            coercer: TypeCoercer::new(CoercionOptions::from(&config.compat)),
            normalizer: Normalizer::from_compat(&config.compat),
            config,
            source,
            destination,
            source_schemas: HashMap::new(),
            destination_schemas: HashMap::new(),
            phase: MigrationPhase::Init,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an external token to cancel the run between batches.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check both connections without failing on the first error.
    pub async fn health_check(&self) -> HealthCheckResult {
        let source = probe_source(self.source.as_ref()).await;
        let destination = probe_destination(self.destination.as_ref()).await;
        HealthCheckResult::new(Some(source), Some(destination))
    }

    /// Migrate the configured source table to the configured destination table.
    pub async fn migrate(&mut self) -> Result<MigrationResult> {
        let source_table = self.config.source.table.clone();
        let destination_table = self.config.destination_table().to_string();
        self.migrate_table(&source_table, &destination_table).await
    }

    /// Run one table through the state machine.
    pub async fn migrate_table(
        &mut self,
        source_table: &str,
        destination_table: &str,
    ) -> Result<MigrationResult> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        self.phase = MigrationPhase::Init;
        info!(
            "Starting migration run {}: {} -> {} ({})",
            run_id,
            source_table,
            destination_table,
            self.destination.kind()
        );

        match self.run(source_table, destination_table).await {
            Ok(totals) => {
                let completed_at = Utc::now();
                let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
                let rows_per_second = if duration > 0.0 {
                    (totals.rows as f64 / duration) as i64
                } else {
                    0
                };
                let status = if self.config.run.dry_run {
                    "dry_run"
                } else {
                    "completed"
                };
                let result = MigrationResult {
                    run_id,
                    status: status.to_string(),
                    source_table: source_table.to_string(),
                    destination_table: destination_table.to_string(),
                    total_rows: totals.rows,
                    total_batches: totals.batches,
                    started_at,
                    completed_at,
                    duration_seconds: duration,
                    rows_per_second,
                    config_hash: self.config.hash(),
                };
                info!(
                    "Migration {}: {} rows in {} batches in {:.1}s ({} rows/s)",
                    result.status,
                    result.total_rows,
                    result.total_batches,
                    result.duration_seconds,
                    result.rows_per_second
                );
                Ok(result)
            }
            Err(e) => {
                let failed_in = self.phase;
                if self.phase.can_transition_to(MigrationPhase::Failed) {
                    self.phase = MigrationPhase::Failed;
                }
                error!("Migration {} failed during {}: {}", run_id, failed_in, e);
                Err(e)
            }
        }
    }

    async fn run(&mut self, source_table: &str, destination_table: &str) -> Result<BatchTotals> {
        // Phase 1: Connectivity
        info!("Phase 1: Checking connectivity");
        self.check_connectivity().await?;
        self.advance(MigrationPhase::ConnectivityChecked)?;

        // Phase 2: Schema
        info!(
            "Phase 2: Reconciling schema (mode: {:?})",
            self.config.run.mode
        );
        let plan = self.reconcile_schema(source_table, destination_table).await?;
        self.advance(MigrationPhase::SchemaReconciled)?;

        if self.config.run.dry_run {
            info!("Dry run: skipping data migration");
            self.advance(MigrationPhase::Done)?;
            return Ok(BatchTotals::default());
        }

        // Phase 3: Data
        info!("Phase 3: Migrating data");
        self.advance(MigrationPhase::DataMigrating)?;
        let totals = self.migrate_data(&plan).await?;
        self.advance(MigrationPhase::Done)?;
        Ok(totals)
    }

    fn advance(&mut self, next: MigrationPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(MigrateError::migration(
                "",
                format!("invalid phase transition {} -> {}", self.phase, next),
            ));
        }
        debug!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    async fn check_connectivity(&self) -> Result<()> {
        self.source
            .test_connection()
            .await
            .map_err(|e| as_connection_error(self.source.name(), e))?;
        self.destination
            .test_connection()
            .await
            .map_err(|e| as_connection_error(self.destination.name(), e))?;
        info!(
            "Connected to source {} and destination {}",
            self.source.name(),
            self.destination.name()
        );
        Ok(())
    }

    async fn source_schema(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        if let Some(schema) = self.source_schemas.get(table) {
            return Ok(schema.clone());
        }
        let schema = self.source.get_table_schema(table).await?;
        debug!("Cached source schema of {} ({} columns)", table, schema.len());
        self.source_schemas.insert(table.to_string(), schema.clone());
        Ok(schema)
    }

    async fn destination_schema(&mut self, table: &str) -> Result<Vec<DestinationColumn>> {
        if let Some(schema) = self.destination_schemas.get(table) {
            return Ok(schema.clone());
        }
        let schema = self.destination.get_table_schema(table).await?;
        debug!("Cached destination schema of {} ({} columns)", table, schema.len());
        self.destination_schemas
            .insert(table.to_string(), schema.clone());
        Ok(schema)
    }

    async fn reconcile_schema(
        &mut self,
        source_table: &str,
        destination_table: &str,
    ) -> Result<ReconciledTable> {
        let source_schema = self.source_schema(source_table).await?;
        let plan = plan_table(
            &self.config,
            source_table,
            destination_table,
            &source_schema,
            self.mapper.as_ref(),
        )?;

        let scope = self.destination.scope().to_string();
        let exists = self
            .destination
            .table_exists(&scope, destination_table)
            .await?;
        let kind = self.destination.kind();
        let mode = self.config.run.mode;

        if self.config.run.dry_run {
            info!(
                "Dry run: {}.{} exists={}, would write {} columns",
                scope,
                destination_table,
                exists,
                plan.columns.len()
            );
            for col in &plan.columns {
                info!("  {} {}", col.name, col.data_type);
            }
            let destination_columns = plan.columns.clone();
            return Ok(ReconciledTable {
                plan,
                source_schema,
                destination_columns,
                first_write: write_mode_for(mode),
            });
        }

        let mut first_write = write_mode_for(mode);
        match (exists, mode) {
            (true, WriteDisposition::Overwrite) => match kind {
                DestinationKind::Relational => {
                    info!("Overwrite: truncating {}.{}", scope, destination_table);
                    self.destination.truncate_table(destination_table).await?;
                    // Already empty; a truncating first write would empty it again.
                    first_write = WriteMode::Append;
                }
                DestinationKind::Analytical => {
                    info!("Overwrite: recreating {}.{}", scope, destination_table);
                    self.destination
                        .delete_table(&scope, destination_table)
                        .await?;
                    self.destination
                        .create_table(destination_table, &plan.columns, WriteMode::Truncate)
                        .await?;
                }
            },
            (true, WriteDisposition::Append) => {
                debug!("Appending to existing {}.{}", scope, destination_table);
            }
            (false, _) => {
                self.source.validate_table_access(source_table).await?;
                self.destination
                    .create_table(destination_table, &plan.columns, write_mode_for(mode))
                    .await?;
            }
        }

        let destination_columns = match kind {
            DestinationKind::Relational => self.destination_schema(destination_table).await?,
            DestinationKind::Analytical => plan.columns.clone(),
        };

        Ok(ReconciledTable {
            plan,
            source_schema,
            destination_columns,
            first_write,
        })
    }

    async fn migrate_data(&self, table: &ReconciledTable) -> Result<BatchTotals> {
        let source_table = table.plan.source_table.as_str();
        let destination_table = table.plan.destination_table.as_str();
        let batch_size = self.config.run.get_batch_size();
        let mut mode = table.first_write;
        let mut totals = BatchTotals::default();

        let mut batches = self.source.read_table(source_table, batch_size);
        let mut batch_no = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                warn!(
                    "Migration of {} cancelled after {} batches",
                    source_table, totals.batches
                );
                return Err(MigrateError::Cancelled);
            }

            let Some(next) = batches.next().await else {
                break;
            };
            batch_no += 1;
            let raw = next.map_err(|e| batch_error(destination_table, e))?;
            let read_rows = raw.num_rows();

            let payload = self
                .prepare_batch(table, raw)
                .map_err(|e| batch_error(destination_table, e))?;
            if payload.num_rows() == 0 {
                debug!("Batch {}: no rows left to write", batch_no);
                continue;
            }

            let written = self
                .destination
                .write_batch(destination_table, payload, mode)
                .await
                .map_err(|e| batch_error(destination_table, e))?;
            totals.rows += written;
            totals.batches += 1;
            debug!(
                "Batch {}: read {} rows, wrote {} ({:?})",
                batch_no, read_rows, written, mode
            );
            mode = WriteMode::Append;
        }

        info!(
            "Migrated {} rows in {} batches to {}",
            totals.rows, totals.batches, destination_table
        );
        Ok(totals)
    }

    /// coerce -> drop partitions -> transform -> normalize for the destination.
    fn prepare_batch(&self, table: &ReconciledTable, raw: RowBatch) -> Result<LoadBatch> {
        let mut batch = self.coercer.coerce(raw, &table.source_schema);
        batch.retain_columns(|c| {
            !table
                .source_schema
                .iter()
                .any(|d| d.is_partition && d.name.eq_ignore_ascii_case(&c.name))
        });

        if let Some(transformer) = &table.plan.transformer {
            batch = transformer.apply(batch)?;
        }

        let destination_table = table.plan.destination_table.as_str();
        match self.destination.kind() {
            DestinationKind::Relational => {
                self.normalizer
                    .for_relational(destination_table, batch, &table.destination_columns)
            }
            DestinationKind::Analytical => {
                self.normalizer
                    .for_analytical(destination_table, batch, &table.plan.mapping)
            }
        }
    }
}

/// Everything the data phase needs about one table.
struct ReconciledTable {
    plan: TablePlan,
    source_schema: Vec<ColumnDescriptor>,
    destination_columns: Vec<DestinationColumn>,
    /// Mode of the first write; every later write appends.
    first_write: WriteMode,
}

fn write_mode_for(mode: WriteDisposition) -> WriteMode {
    match mode {
        WriteDisposition::Overwrite => WriteMode::Truncate,
        WriteDisposition::Append => WriteMode::Append,
    }
}

fn as_connection_error(endpoint: &str, e: MigrateError) -> MigrateError {
    match e {
        MigrateError::Connection { .. } => e,
        other => MigrateError::connection(endpoint, other),
    }
}

/// Errors with their own diagnostics pass through; anything else is
/// wrapped as a data migration failure of the table.
fn batch_error(table: &str, e: MigrateError) -> MigrateError {
    match e {
        MigrateError::NonNullableViolation { .. }
        | MigrateError::Serialization { .. }
        | MigrateError::MappingValidation(_)
        | MigrateError::DataMigration { .. }
        | MigrateError::Cancelled => e,
        other => MigrateError::migration(table, other),
    }
}
