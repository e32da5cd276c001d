//! # dw-migrate
//!
//! Columnar warehouse table migration library.
//!
//! Moves a warehouse table (latest partition only) into an analytical
//! warehouse or a relational database, one batch at a time:
//!
//! - **Schema-driven coercion**: declared source types decide every column's representation
//! - **Mapping plans**: include, exclude, rename, computed columns, defaults, ordering
//! - **Destination normalization**: Arrow conversion with per-column diagnostics for
//!   analytical loads, declared defaults and a null policy for relational loads
//! - **Type mapping** from warehouse types to both destination type systems
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dw_migrate::{Config, Migrator, MysqlDestination, WarehouseSession, WarehouseSource};
//!
//! async fn run<S: WarehouseSession + 'static>(session: S) -> dw_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let Some(mysql) = config.destination.mysql.clone() else {
//!         return Ok(());
//!     };
//!     let destination = Arc::new(MysqlDestination::new(&mysql)?);
//!     let source = Arc::new(WarehouseSource::new(session, config.source.endpoint.clone()));
//!     let mut migrator = Migrator::new(config, source, destination)?;
//!     let result = migrator.migrate().await?;
//!     println!("Migrated {} rows", result.total_rows);
//!     Ok(())
//! }
//! ```

pub mod coerce;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod mapping;
pub mod normalize;
pub mod orchestrator;
pub mod source;
pub mod typemap;

// Re-exports for convenient access
pub use coerce::{CoercionOptions, TypeCoercer};
pub use config::{CompatConfig, Config, MysqlConfig, NullPolicy, WriteDisposition};
pub use crate::core::{
    ColumnData, ColumnDescriptor, ColumnKind, Destination, DestinationColumn, DestinationKind,
    LoadBatch, RowBatch, SourceReader, SqlValue, WriteMode,
};
pub use drivers::MysqlDestination;
pub use error::{MigrateError, Result};
pub use mapping::{MappingPlan, RowTransformer};
pub use normalize::Normalizer;
pub use orchestrator::{HealthCheckResult, MigrationPhase, MigrationResult, Migrator};
pub use source::{LatestPartitionQuery, SchemaFileSource, WarehouseSession, WarehouseSource};
