//! Mapping to the analytical warehouse type system (BigQuery standard SQL names).

use crate::core::{base_type, ColumnMode, DestinationColumn, DestinationKind, TypeMapper, TypeMapping};

use super::{generic_args, split_top_level};

/// Maps source types to analytical warehouse field types.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyticalTypeMapper;

impl AnalyticalTypeMapper {
    pub fn new() -> Self {
        Self
    }

    fn map_array(&self, source_type: &str) -> TypeMapping {
        let Some(inner) = generic_args(source_type) else {
            return TypeMapping::lossy(
                "STRING",
                format!("array type '{}' has no element type, stored as STRING", source_type),
            );
        };
        let element = self.map_type(inner);
        if element.mode == ColumnMode::Repeated {
            return TypeMapping::lossy(
                "STRING",
                format!("nested array '{}' cannot be repeated twice, stored as STRING", source_type),
            );
        }
        element.repeated()
    }

    fn map_map(&self, source_type: &str) -> TypeMapping {
        let args = generic_args(source_type).map(split_top_level).unwrap_or_default();
        let warning = match args.as_slice() {
            [k, v] => format!(
                "map<{},{}> stored as RECORD with STRING key/value fields",
                k, v
            ),
            _ => format!("'{}' stored as RECORD with STRING key/value fields", source_type),
        };
        TypeMapping::lossy("RECORD", warning).with_subfields(vec![
            DestinationColumn::new("key", "STRING"),
            DestinationColumn::new("value", "STRING"),
        ])
    }
}

impl TypeMapper for AnalyticalTypeMapper {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Analytical
    }

    fn map_type(&self, source_type: &str) -> TypeMapping {
        match base_type(source_type).as_str() {
            "bigint" | "int" | "integer" | "smallint" | "tinyint" => TypeMapping::lossless("INT64"),
            "double" | "float" => TypeMapping::lossless("FLOAT64"),
            "decimal" | "numeric" => TypeMapping::lossless("NUMERIC"),
            "string" | "varchar" | "char" => TypeMapping::lossless("STRING"),
            "boolean" | "bool" => TypeMapping::lossless("BOOL"),
            "datetime" => TypeMapping::lossless("DATETIME"),
            "timestamp" | "timestamp_ntz" => TypeMapping::lossless("TIMESTAMP"),
            "date" => TypeMapping::lossless("DATE"),
            "binary" => TypeMapping::lossless("BYTES"),
            "array" => self.map_array(source_type),
            "map" => self.map_map(source_type),
            "struct" => TypeMapping::lossy(
                "RECORD",
                format!("struct fields of '{}' are not parsed, stored as opaque RECORD", source_type),
            ),
            _ => TypeMapping::lossy(
                self.text_type(),
                format!("unknown type '{}' stored as STRING", source_type),
            ),
        }
    }

    fn text_type(&self) -> &'static str {
        "STRING"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(t: &str) -> TypeMapping {
        AnalyticalTypeMapper::new().map_type(t)
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(map("bigint").target_type, "INT64");
        assert_eq!(map("TINYINT").target_type, "INT64");
        assert_eq!(map("double").target_type, "FLOAT64");
        assert_eq!(map("decimal(10,2)").target_type, "NUMERIC");
        assert_eq!(map("varchar(32)").target_type, "STRING");
        assert_eq!(map("boolean").target_type, "BOOL");
        assert_eq!(map("datetime").target_type, "DATETIME");
        assert_eq!(map("timestamp").target_type, "TIMESTAMP");
        assert_eq!(map("date").target_type, "DATE");
        assert_eq!(map("binary").target_type, "BYTES");
        assert!(!map("bigint").is_lossy);
    }

    #[test]
    fn test_array_is_repeated_inner_type() {
        let m = map("array<bigint>");
        assert_eq!(m.target_type, "INT64");
        assert_eq!(m.mode, ColumnMode::Repeated);

        let m = map("array<map<string,string>>");
        assert_eq!(m.target_type, "RECORD");
        assert_eq!(m.mode, ColumnMode::Repeated);
        assert_eq!(m.subfields.len(), 2);
    }

    #[test]
    fn test_nested_array_falls_back_to_text() {
        let m = map("array<array<int>>");
        assert_eq!(m.target_type, "STRING");
        assert_eq!(m.mode, ColumnMode::Nullable);
        assert!(m.is_lossy);
    }

    #[test]
    fn test_map_has_key_value_subfields() {
        let m = map("map<string,bigint>");
        assert_eq!(m.target_type, "RECORD");
        let names: Vec<_> = m.subfields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["key", "value"]);
        assert!(m.warning.is_some());
    }

    #[test]
    fn test_struct_is_opaque_record() {
        let m = map("struct<a:int,b:string>");
        assert_eq!(m.target_type, "RECORD");
        assert!(m.subfields.is_empty());
        assert!(m.is_lossy);
    }

    #[test]
    fn test_unknown_is_string_with_warning() {
        let m = map("interval_day_time");
        assert_eq!(m.target_type, "STRING");
        assert!(m.warning.unwrap().contains("interval_day_time"));
    }
}
