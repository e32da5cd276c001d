//! MySQL/MariaDB relational destination.
//!
//! - [`MysqlDialect`]: identifier quoting, DDL and INSERT generation
//! - [`MysqlDestination`]: pooled [`Destination`](crate::core::Destination) implementation
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod writer;

pub use dialect::MysqlDialect;
pub use writer::MysqlDestination;
