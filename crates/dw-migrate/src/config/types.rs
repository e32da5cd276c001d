//! Configuration type definitions.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::core::DestinationKind;
use crate::mapping::MappingPlan;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source warehouse configuration.
    pub source: SourceConfig,

    /// Destination configuration.
    pub destination: DestinationConfig,

    /// Run behavior.
    #[serde(default)]
    pub run: RunConfig,

    /// Null-handling compatibility switches.
    #[serde(default)]
    pub compat: CompatConfig,

    /// Column mapping plans.
    #[serde(default)]
    pub mappings: MappingsConfig,
}

/// Source warehouse configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Warehouse type (default: "maxcompute").
    #[serde(default = "default_maxcompute")]
    pub r#type: String,

    /// Project holding the source table.
    #[serde(default)]
    pub project: String,

    /// Service endpoint.
    #[serde(default)]
    pub endpoint: String,

    /// Access key id.
    #[serde(default)]
    pub access_id: String,

    /// Access key secret.
    #[serde(default)]
    pub secret_key: String,

    /// Table to migrate.
    #[serde(default)]
    pub table: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("project", &self.project)
            .field("endpoint", &self.endpoint)
            .field("access_id", &self.access_id)
            .field("secret_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

/// Destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination kind: analytical (bigquery) or relational (mysql).
    pub r#type: DestinationKind,

    /// Destination table name (default: source table name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Analytical project.
    #[serde(default)]
    pub project: String,

    /// Analytical dataset.
    #[serde(default)]
    pub dataset: String,

    /// Relational connection settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<MysqlConfig>,
}

/// MySQL destination connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl MysqlConfig {
    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(4)
    }
}

impl fmt::Debug for MysqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Run behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Write disposition (default: append).
    #[serde(default)]
    pub mode: WriteDisposition,

    /// Rows per batch (default: 10000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Log level used when the CLI gets no explicit verbosity.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Plan only: no DDL, no writes.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: WriteDisposition::default(),
            batch_size: None,
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

impl RunConfig {
    pub fn get_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(10_000)
    }
}

/// How a run treats an existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    /// Replace the table contents: the first batch truncates, the rest append.
    Overwrite,

    /// Add to the existing contents.
    #[default]
    Append,
}

/// Handling of nulls in non-nullable destination columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Abort with a per-column violation count.
    #[default]
    Fail,

    /// Fill textual and temporal columns with the sentinel; numeric columns still fail.
    Fill,

    /// Drop the offending rows.
    Skip,
}

/// Null-handling compatibility switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatConfig {
    /// Keep literal null tokens ("null", "None", ...) in string columns (default: true).
    #[serde(default = "default_true")]
    pub preserve_string_null_tokens: bool,

    /// Tokens mapped to null when preservation is off. List or comma-separated string.
    #[serde(
        default = "default_null_tokens",
        deserialize_with = "deserialize_token_list"
    )]
    pub string_null_tokens: Vec<String>,

    /// Match null tokens case-insensitively (default: true).
    #[serde(default = "default_true")]
    pub string_null_tokens_case_insensitive: bool,

    /// Map empty strings in string columns to null (default: false).
    #[serde(default)]
    pub treat_empty_string_as_null: bool,

    /// Policy for nulls in non-nullable destination columns (default: fail).
    #[serde(default)]
    pub null_on_non_nullable: NullPolicy,

    /// Sentinel used by the fill policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_fill_sentinel: Option<String>,
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            preserve_string_null_tokens: true,
            string_null_tokens: default_null_tokens(),
            string_null_tokens_case_insensitive: true,
            treat_empty_string_as_null: false,
            null_on_non_nullable: NullPolicy::default(),
            null_fill_sentinel: None,
        }
    }
}

/// Mapping plans: a default plus per-table overlays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingsConfig {
    #[serde(default)]
    pub default: MappingPlan,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableMapping>,
}

/// Mapping plan for one source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapping {
    pub source_table: String,

    #[serde(flatten)]
    pub plan: MappingPlan,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenList {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_token_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tokens = match TokenList::deserialize(deserializer)? {
        TokenList::List(list) => list,
        TokenList::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

// Default value functions for serde
fn default_maxcompute() -> String {
    "maxcompute".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_null_tokens() -> Vec<String> {
    ["nan", "None", "null", "<NA>", "NaN"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
