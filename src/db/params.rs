//! Parameter binding for MySQL queries.

use crate::models::SqlValue;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::UInt(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}
