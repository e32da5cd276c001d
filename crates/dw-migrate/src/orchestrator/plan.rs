//! Schema planning: mapping plan validation, preparation and type mapping.

use tracing::{debug, info};

use crate::config::Config;
use crate::core::{ColumnDescriptor, DestinationColumn, DestinationKind, TypeMapper};
use crate::error::Result;
use crate::mapping::{prepare, validate, MappingPlan, PreparedMapping, RowTransformer};
use crate::normalize::dedupe_columns;

/// How one source table maps onto its destination table.
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub source_table: String,
    pub destination_table: String,
    /// Prepared columns with their declared source types.
    pub mapping: PreparedMapping,
    /// Destination column definitions, in table order.
    pub columns: Vec<DestinationColumn>,
    /// Per-batch transform, present when a mapping plan applies.
    pub transformer: Option<RowTransformer>,
}

/// Plan a table. A mapping plan is validated before anything else, so an
/// inconsistent plan never reaches the destination.
pub fn plan_table(
    config: &Config,
    source_table: &str,
    destination_table: &str,
    source_schema: &[ColumnDescriptor],
    mapper: &dyn TypeMapper,
) -> Result<TablePlan> {
    let plan = config.plan_for(source_table);
    if let Some(plan) = &plan {
        validate(plan, source_schema)?;
        debug!("Mapping plan for {} is valid", source_table);
    }

    let mapping = prepare(plan.as_ref().unwrap_or(&MappingPlan::default()), source_schema);
    let mut columns = mapping.destination_columns(mapper)?;
    if mapper.kind() == DestinationKind::Relational {
        columns = dedupe_columns(&columns);
    }

    let transformer = plan.map(RowTransformer::new).transpose()?;

    info!(
        "Planned {} -> {}: {} columns{}",
        source_table,
        destination_table,
        columns.len(),
        if transformer.is_some() { " (mapped)" } else { "" }
    );

    Ok(TablePlan {
        source_table: source_table.to_string(),
        destination_table: destination_table.to_string(),
        mapping,
        columns,
        transformer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::typemap::mapper_for;

    fn schema() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", "bigint"),
            ColumnDescriptor::new("status", "string"),
            ColumnDescriptor::partition("pt", "string"),
        ]
    }

    fn config(mappings: &str) -> Config {
        Config::from_yaml(&format!(
            "source: {{table: orders}}\ndestination:\n  type: mysql\n  mysql: {{host: h, user: u, database: dw}}\n{}",
            mappings
        ))
        .unwrap()
    }

    #[test]
    fn test_plan_without_mapping() {
        let mapper = mapper_for(DestinationKind::Relational);
        let plan = plan_table(&config(""), "orders", "orders", &schema(), mapper.as_ref()).unwrap();
        assert!(plan.transformer.is_none());
        let names: Vec<&str> = plan.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "status"]);
        assert_eq!(plan.columns[0].data_type, "BIGINT");
    }

    #[test]
    fn test_plan_with_rename_and_computed() {
        let cfg = config(
            "mappings:\n  tables:\n    - source_table: orders\n      rename: {status: status_code}\n      computed:\n        loaded_at: {func: now}\n",
        );
        let mapper = mapper_for(DestinationKind::Analytical);
        let plan = plan_table(&cfg, "orders", "orders", &schema(), mapper.as_ref()).unwrap();
        let names: Vec<&str> = plan.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "status_code", "loaded_at"]);
        assert_eq!(plan.columns[2].data_type, "TIMESTAMP");
        assert!(plan.transformer.is_some());
    }

    #[test]
    fn test_invalid_plan_rejected() {
        let cfg = config(
            "mappings:\n  default:\n    rename: {id: code, status: CODE}\n",
        );
        let mapper = mapper_for(DestinationKind::Relational);
        let err = plan_table(&cfg, "orders", "orders", &schema(), mapper.as_ref()).unwrap_err();
        assert!(matches!(err, MigrateError::MappingValidation(_)));
    }
}
