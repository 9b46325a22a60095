//! SQL construction and inspection.
//!
//! Pure functions, no database access:
//! - Identifier quoting
//! - Upsert statement building
//! - Transaction composition for multi-row upserts
//! - `?` / `??` template expansion
//! - Statement splitting and classification

pub mod builder;
pub mod escape;
pub mod format;
pub mod lexer;
pub mod plan;
pub mod statement;
pub mod validator;

pub use builder::build_upsert_sql;
pub use escape::quote_identifier;
pub use format::format_sql;
pub use plan::{UpsertPlan, build_upsert_plan};
pub use statement::BoundStatement;
pub use validator::{StatementKind, inspect};
