//! Upsert statement construction.

use crate::error::{GatewayError, GatewayResult};
use crate::models::Row;

use super::escape::quote_identifier;
use super::statement::BoundStatement;
use super::validator::StatementKind;

/// Build `INSERT ... ON DUPLICATE KEY UPDATE` for one row.
///
/// Columns appear in row order, every value is bound as a parameter, and the
/// update clause assigns every column from its inserted value:
///
/// ```
/// use sql_gateway::models::{Row, SqlValue};
/// use sql_gateway::sql::build_upsert_sql;
///
/// let row = Row::from_pairs([("id", SqlValue::Int(1)), ("name", "Ann".into())]).unwrap();
/// let stmt = build_upsert_sql("users", &row).unwrap();
/// assert_eq!(
///     stmt.sql,
///     "INSERT INTO `users` (`id`, `name`) VALUES (?, ?) \
///      ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `name` = VALUES(`name`)"
/// );
/// assert_eq!(stmt.params.len(), 2);
/// ```
pub fn build_upsert_sql(table: &str, row: &Row) -> GatewayResult<BoundStatement> {
    if row.is_empty() {
        return Err(GatewayError::validation(format!(
            "Row for table '{}' has no columns",
            table
        )));
    }

    let table = quote_identifier(table)?;
    let columns = row
        .columns()
        .map(quote_identifier)
        .collect::<GatewayResult<Vec<_>>>()?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates = columns
        .iter()
        .map(|c| format!("{c} = VALUES({c})"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
        table,
        columns.join(", "),
        placeholders,
        updates
    );
    let params = row.iter().map(|(_, v)| v.clone()).collect();

    Ok(BoundStatement::new(sql, params, StatementKind::Write))
}
