//! Core abstractions shared by every stage of the migration pipeline.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    base_type, ColumnDescriptor, ColumnMode, DestinationColumn, DestinationKind, TypeFamily,
};
pub use traits::{
    BatchStream, Destination, LoadBatch, SourceReader, TypeMapper, TypeMapping, WriteMode,
};
pub use value::{ColumnData, ColumnKind, RowBatch, SqlValue};
