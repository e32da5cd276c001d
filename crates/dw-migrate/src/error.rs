//! Error types for the migration library.

use thiserror::Error;

/// A column that could not be converted to the columnar load format.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFailure {
    /// Column name in the batch.
    pub column: String,
    /// Declared source type, or the batch representation when the column has no declaration.
    pub declared_type: String,
    /// A few distinct example values from the column.
    pub examples: Vec<String>,
    /// Converter message.
    pub reason: String,
}

impl std::fmt::Display for ColumnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {} [examples: {}]",
            self.column,
            self.declared_type,
            self.reason,
            self.examples.join(", ")
        )
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or destination unreachable
    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// A column descriptor is malformed and cannot be mapped
    #[error("Schema conversion failed: {0}")]
    SchemaConversion(String),

    /// The declarative mapping plan is inconsistent
    #[error("Mapping plan is invalid: {}", .0.join("; "))]
    MappingValidation(Vec<String>),

    /// Batch loop failure for a specific table
    #[error("Data migration failed for table {table}: {message}")]
    DataMigration { table: String, message: String },

    /// Nulls in non-nullable destination columns under the fail policy
    #[error("Null values in non-nullable columns of {table}: {}", format_violations(.violations))]
    NonNullableViolation {
        table: String,
        violations: Vec<(String, usize)>,
    },

    /// Columns that failed conversion to the columnar load format
    #[error("Batch for {table} cannot be serialized: {}", format_failures(.failures))]
    Serialization {
        table: String,
        failures: Vec<ColumnFailure>,
    },

    /// Operation not available for this destination kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Migration was cancelled between batches
    #[error("Migration cancelled")]
    Cancelled,

    /// MySQL driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// Arrow conversion error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_violations(violations: &[(String, usize)]) -> String {
    violations
        .iter()
        .map(|(col, n)| format!("{}={}", col, n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_failures(failures: &[ColumnFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl MigrateError {
    /// Create a Connection error for the given endpoint
    pub fn connection(endpoint: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a DataMigration error
    pub fn migration(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::DataMigration {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Connection { .. } | MigrateError::Mysql(_) => 2,
            MigrateError::SchemaConversion(_) => 3,
            MigrateError::MappingValidation(_) => 4,
            MigrateError::DataMigration { .. }
            | MigrateError::Serialization { .. }
            | MigrateError::Arrow(_)
            | MigrateError::Unsupported(_)
            | MigrateError::Json(_) => 5,
            MigrateError::NonNullableViolation { .. } => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
