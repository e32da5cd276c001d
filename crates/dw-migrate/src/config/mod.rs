//! Configuration loading and validation.

mod env;
mod types;
mod validation;

pub use env::expand_value;
pub use types::*;

use crate::core::DestinationKind;
use crate::error::Result;
use crate::mapping::MappingPlan;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML (or JSON) file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string, expanding `$VAR` placeholders.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let config: Config = serde_yaml::from_value(expand_value(raw))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 fingerprint of the configuration.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Destination table name, defaulting to the source table name.
    pub fn destination_table(&self) -> &str {
        self.destination
            .table
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.source.table)
    }

    /// Dataset (analytical) or database (relational) holding the destination table.
    pub fn destination_scope(&self) -> &str {
        match self.destination.r#type {
            DestinationKind::Analytical => &self.destination.dataset,
            DestinationKind::Relational => self
                .destination
                .mysql
                .as_ref()
                .map(|m| m.database.as_str())
                .unwrap_or_default(),
        }
    }

    /// Effective mapping plan for a source table, or `None` when no plan applies.
    ///
    /// The default plan is overlaid by the first per-table entry whose
    /// `source_table` matches case-insensitively.
    pub fn plan_for(&self, source_table: &str) -> Option<MappingPlan> {
        let base = &self.mappings.default;
        let plan = match self
            .mappings
            .tables
            .iter()
            .find(|t| t.source_table.eq_ignore_ascii_case(source_table))
        {
            Some(entry) => base.overlay(&entry.plan),
            None => base.clone(),
        };
        (!plan.is_empty()).then_some(plan)
    }
}
