//! Migration state machine phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a single-table migration.
///
/// `Init -> ConnectivityChecked -> SchemaReconciled -> DataMigrating -> Done`,
/// with `Failed` reachable from any non-terminal phase. A dry run goes from
/// `SchemaReconciled` straight to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    #[default]
    Init,
    ConnectivityChecked,
    SchemaReconciled,
    DataMigrating,
    Done,
    Failed,
}

impl MigrationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationPhase::Done | MigrationPhase::Failed)
    }

    /// Whether `next` may follow this phase.
    pub fn can_transition_to(self, next: MigrationPhase) -> bool {
        use MigrationPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Init, ConnectivityChecked)
            | (ConnectivityChecked, SchemaReconciled)
            | (SchemaReconciled, DataMigrating)
            | (SchemaReconciled, Done)
            | (DataMigrating, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MigrationPhase::Init => "INIT",
            MigrationPhase::ConnectivityChecked => "CONNECTIVITY_CHECKED",
            MigrationPhase::SchemaReconciled => "SCHEMA_RECONCILED",
            MigrationPhase::DataMigrating => "DATA_MIGRATING",
            MigrationPhase::Done => "DONE",
            MigrationPhase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
