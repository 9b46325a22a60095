//! Transaction composition for upserts.

use crate::error::{GatewayError, GatewayResult};
use crate::models::RowSet;

use super::builder::build_upsert_sql;
use super::statement::BoundStatement;

/// Ordered statements for one upsert request, run on a single connection.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPlan {
    pub statements: Vec<BoundStatement>,
    /// True when `statements` is wrapped in START TRANSACTION / COMMIT.
    pub transactional: bool,
}

impl UpsertPlan {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of rows the plan writes.
    pub fn row_count(&self) -> usize {
        if self.transactional {
            self.statements.len().saturating_sub(2)
        } else {
            self.statements.len()
        }
    }
}

/// Build the upsert plan for one or more rows.
///
/// A single row is one bare statement. Two or more rows become
/// `START TRANSACTION`, one upsert per row in input order, then `COMMIT`.
pub fn build_upsert_plan(table: &str, rows: &RowSet) -> GatewayResult<UpsertPlan> {
    let rows = rows.rows();
    match rows {
        [] => Err(GatewayError::validation("No rows to upsert")),
        [row] => Ok(UpsertPlan {
            statements: vec![build_upsert_sql(table, row)?],
            transactional: false,
        }),
        _ => {
            let mut statements = Vec::with_capacity(rows.len() + 2);
            statements.push(BoundStatement::start_transaction());
            for (index, row) in rows.iter().enumerate() {
                let stmt = build_upsert_sql(table, row).map_err(|e| match e {
                    GatewayError::Validation { message } => {
                        GatewayError::validation(format!("rows[{}]: {}", index, message))
                    }
                    other => other,
                })?;
                statements.push(stmt);
            }
            statements.push(BoundStatement::commit());
            Ok(UpsertPlan {
                statements,
                transactional: true,
            })
        }
    }
}
