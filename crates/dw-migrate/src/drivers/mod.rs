//! Destination drivers.
//!
//! - [`mysql`]: relational destination over `mysql_async`
//!
//! The analytical destination has no bundled client; callers implement
//! [`Destination`](crate::core::Destination) for their warehouse of choice
//! and receive Arrow payloads.

pub mod mysql;

pub use mysql::{MysqlDestination, MysqlDialect};
