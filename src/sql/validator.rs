//! Statement inspection.
//!
//! Counts and classifies the statements in a piece of SQL so the executor can
//! enforce single-statement mode and decide whether a statement returns rows.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) with the MySQL dialect. SQL the
//! parser does not understand still goes to the server (MySQL accepts more than
//! sqlparser does); it is then split lexically and classified by its first
//! keyword.

use crate::error::{GatewayError, GatewayResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use super::lexer::{SegmentKind, segments, split_statements};

/// Type of SQL statement detected by the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT, SHOW, DESCRIBE, EXPLAIN, VALUES
    Query,
    /// INSERT, UPDATE, DELETE, REPLACE
    Write,
    /// CREATE, DROP, ALTER, TRUNCATE, RENAME
    Ddl,
    /// START TRANSACTION, BEGIN, COMMIT, ROLLBACK, SAVEPOINT
    Transaction,
    /// CALL, SET, USE and anything unrecognized
    Other,
}

impl StatementKind {
    /// Whether a successful run always yields a (possibly empty) row set.
    pub fn returns_rows(self) -> bool {
        matches!(self, Self::Query)
    }
}

/// Classify every statement in `sql`, in order.
///
/// Empty SQL (whitespace or comments only) is a validation error.
pub fn inspect(sql: &str) -> GatewayResult<Vec<StatementKind>> {
    let kinds = match Parser::parse_sql(&MySqlDialect {}, sql) {
        Ok(statements) => statements.iter().map(classify_statement).collect(),
        Err(e) => {
            debug!(error = %e, "SQL not understood by parser, classifying lexically");
            split_statements(sql)
                .into_iter()
                .map(classify_by_keyword)
                .collect::<Vec<_>>()
        }
    };

    if kinds.is_empty() {
        return Err(GatewayError::validation("Empty SQL statement"));
    }
    Ok(kinds)
}

/// Classify a parsed statement.
fn classify_statement(stmt: &Statement) -> StatementKind {
    match stmt {
        Statement::Query(_) => StatementKind::Query,
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. }
        | Statement::Explain { .. } => StatementKind::Query,

        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
            StatementKind::Write
        }

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex(_)
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateTrigger { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::Drop { .. }
        | Statement::DropFunction { .. }
        | Statement::DropProcedure { .. }
        | Statement::DropTrigger { .. }
        | Statement::Truncate { .. } => StatementKind::Ddl,

        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => StatementKind::Transaction,

        _ => StatementKind::Other,
    }
}

/// Classify a statement by its first keyword, skipping leading comments and
/// parentheses.
fn classify_by_keyword(sql: &str) -> StatementKind {
    let keyword = segments(sql)
        .into_iter()
        .filter(|s| s.kind == SegmentKind::Code)
        .flat_map(|s| s.text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_'))
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "VALUES" | "TABLE" => {
            StatementKind::Query
        }
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "LOAD" => StatementKind::Write,
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => StatementKind::Ddl,
        "START" | "BEGIN" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" | "XA" => {
            StatementKind::Transaction
        }
        _ => StatementKind::Other,
    }
}
