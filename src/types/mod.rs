//! Core data types.
//!
//! - `ChatError` / `Result`: error taxonomy for every pipeline stage
//! - `Scalar`, `Row`, `RowSet`: loosely typed result cells
//! - `TableSchema`, `Column`, `ColumnType`: normalized table metadata
//! - `GeneratedQuery`, `QueryResult`: pipeline outputs

pub mod error;
pub mod result;
pub mod schema;
pub mod value;

pub use error::{redact, ChatError, Result, Stage};
pub use result::{GeneratedQuery, QueryResult};
pub use schema::{Column, ColumnType, SchemaOverview, TableSchema};
pub use value::{Row, RowSet, Scalar, ScalarKind};
