//! SQL text paired with its bound parameters.

use crate::models::SqlValue;

use super::validator::StatementKind;

/// A statement ready to run: SQL with `?` placeholders and their values.
///
/// Values are never interpolated into `sql`. A statement without params may
/// hold several `;`-separated statements when multi-statement mode is on;
/// `kind` then describes the last one.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub kind: StatementKind,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>, kind: StatementKind) -> Self {
        Self {
            sql: sql.into(),
            params,
            kind,
        }
    }

    /// A parameterless transaction-control statement.
    pub fn control(sql: &str) -> Self {
        Self::new(sql, Vec::new(), StatementKind::Transaction)
    }

    pub fn start_transaction() -> Self {
        Self::control("START TRANSACTION")
    }

    pub fn commit() -> Self {
        Self::control("COMMIT")
    }

    pub fn rollback() -> Self {
        Self::control("ROLLBACK")
    }

    pub fn placeholder_count(&self) -> usize {
        self.params.len()
    }
}
