//! Data models for the SQL gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod request;
pub mod result;
pub mod value;

// Re-export commonly used types
pub use request::{
    FormatParam, QueryOptions, QueryRequest, QuerySpec, RowSet, StructuredQuery, UpsertRequest,
};
pub use result::{QueryOutput, RunOptions, StatementSummary};
pub use value::{Row, SqlValue};
