//! ZQLZ Core - Core abstractions and traits for the database IDE
//!
//! This crate provides the fundamental traits and types that all other
//! ZQLZ crates depend on. It defines:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` / `Transaction` - Live connections and manual-commit units of work
//! - `SchemaIntrospection` - Trait for schema inspection
//! - `DialectInfo` - SQL dialect metadata (type catalog, quoting, paging)
//! - Common types like `Value`, `Row`, `ColumnMeta`, etc.

mod connection;
mod dialect;
mod driver;
mod error;
mod schema;
mod types;

pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use schema::*;
pub use types::*;
