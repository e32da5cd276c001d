//! Destination compatibility normalization.
//!
//! Runs after coercion and mapping, right before a batch is handed to a
//! destination. The analytical path ends in an Arrow `RecordBatch`; the
//! relational path ends in a row batch shaped like the destination table.

mod analytical;
mod defaults;
mod relational;

pub use analytical::{to_record_batch, validate_serializable};
pub use defaults::parse_default;
pub use relational::{dedupe_columns, enforce_null_policy, fill_declared_defaults, reconcile_columns};

use crate::config::{CompatConfig, NullPolicy};
use crate::core::{DestinationColumn, DestinationKind, LoadBatch, RowBatch};
use crate::error::Result;
use crate::mapping::PreparedMapping;

/// Destination-specific cleanup that needs no destination schema.
pub fn normalize_for_destination(batch: RowBatch, kind: DestinationKind) -> RowBatch {
    match kind {
        DestinationKind::Analytical => analytical::normalize(batch),
        DestinationKind::Relational => relational::normalize(batch),
    }
}

/// Turns mapped batches into destination payloads.
#[derive(Debug, Clone)]
pub struct Normalizer {
    policy: NullPolicy,
    sentinel: Option<String>,
}

impl Normalizer {
    pub fn new(policy: NullPolicy, sentinel: Option<String>) -> Self {
        Self { policy, sentinel }
    }

    pub fn from_compat(compat: &CompatConfig) -> Self {
        Self::new(compat.null_on_non_nullable, compat.null_fill_sentinel.clone())
    }

    pub fn policy(&self) -> NullPolicy {
        self.policy
    }

    /// Analytical payload: normalized, then converted to Arrow with the
    /// prepared column types.
    pub fn for_analytical(
        &self,
        table: &str,
        batch: RowBatch,
        mapping: &PreparedMapping,
    ) -> Result<LoadBatch> {
        let batch = analytical::normalize(batch);
        let record_batch =
            to_record_batch(table, &batch, &mapping.columns, &mapping.type_overrides)?;
        Ok(LoadBatch::Columnar(record_batch))
    }

    /// Relational payload: filtered to the destination schema, normalized,
    /// declared defaults applied, then the null policy.
    pub fn for_relational(
        &self,
        table: &str,
        batch: RowBatch,
        destination: &[DestinationColumn],
    ) -> Result<LoadBatch> {
        let batch = reconcile_columns(batch, destination);
        let mut batch = relational::normalize(batch);
        fill_declared_defaults(&mut batch, destination);
        let batch = enforce_null_policy(
            batch,
            table,
            destination,
            self.policy,
            self.sentinel.as_deref(),
        )?;
        Ok(LoadBatch::Rows(batch))
    }
}
