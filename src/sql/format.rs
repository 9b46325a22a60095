//! `?` / `??` template expansion.
//!
//! Placeholders are matched left to right against positional parameters:
//!
//! | placeholder | parameter          | output                         |
//! |-------------|--------------------|--------------------------------|
//! | `?`         | scalar             | `?` (value bound)              |
//! | `?`         | list               | `?, ?, ?`                      |
//! | `?`         | list of lists      | `(?, ?), (?, ?)`               |
//! | `?`         | object             | `` `a` = ?, `b` = ? ``         |
//! | `??`        | string             | `` `name` ``                   |
//! | `??`        | list of strings    | `` `a`, `b` ``                 |
//!
//! Runs of three or more `?` are copied through. Placeholders inside quoted
//! text or comments are ignored. Parameters left over at the end are ignored.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{FormatParam, SqlValue};

use super::escape::quote_identifier;
use super::lexer::{SegmentKind, segments};

/// Expand `template` against `params`.
///
/// Returns SQL containing only `?` value placeholders, plus the values to bind
/// in placeholder order.
pub fn format_sql(
    template: &str,
    params: &[FormatParam],
) -> GatewayResult<(String, Vec<SqlValue>)> {
    let mut sql = String::with_capacity(template.len());
    let mut values = Vec::new();
    let mut next = params.iter();
    let mut placeholder = 0usize;

    for seg in segments(template) {
        if seg.kind != SegmentKind::Code {
            sql.push_str(seg.text);
            continue;
        }
        let mut rest = seg.text;
        while let Some(pos) = rest.find('?') {
            sql.push_str(&rest[..pos]);
            let run = rest[pos..].bytes().take_while(|&b| b == b'?').count();
            rest = &rest[pos + run..];

            if run > 2 {
                sql.push_str(&"?".repeat(run));
                continue;
            }

            placeholder += 1;
            let param = next.next().ok_or_else(|| {
                GatewayError::validation(format!(
                    "Not enough format parameters: placeholder #{} has no value",
                    placeholder
                ))
            })?;
            if run == 2 {
                expand_identifier(param, &mut sql)?;
            } else {
                expand_value(param, &mut sql, &mut values)?;
            }
        }
        sql.push_str(rest);
    }

    Ok((sql, values))
}

fn expand_value(
    param: &FormatParam,
    sql: &mut String,
    values: &mut Vec<SqlValue>,
) -> GatewayResult<()> {
    match param {
        FormatParam::Scalar(v) => {
            sql.push('?');
            values.push(v.clone());
        }
        FormatParam::List(items) => {
            if items.is_empty() {
                return Err(GatewayError::validation(
                    "Empty list cannot fill a '?' placeholder",
                ));
            }
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                match item {
                    FormatParam::Scalar(v) => {
                        sql.push('?');
                        values.push(v.clone());
                    }
                    FormatParam::List(group) => {
                        sql.push('(');
                        push_scalar_list(group, sql, values)?;
                        sql.push(')');
                    }
                    FormatParam::Object(_) => {
                        return Err(GatewayError::validation(
                            "Objects are not allowed inside list parameters",
                        ));
                    }
                }
            }
        }
        FormatParam::Object(row) => {
            if row.is_empty() {
                return Err(GatewayError::validation(
                    "Empty object cannot fill a '?' placeholder",
                ));
            }
            for (i, (column, v)) in row.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&quote_identifier(column)?);
                sql.push_str(" = ?");
                values.push(v.clone());
            }
        }
    }
    Ok(())
}

fn push_scalar_list(
    items: &[FormatParam],
    sql: &mut String,
    values: &mut Vec<SqlValue>,
) -> GatewayResult<()> {
    if items.is_empty() {
        return Err(GatewayError::validation("Empty nested list in parameters"));
    }
    for (i, item) in items.iter().enumerate() {
        let FormatParam::Scalar(v) = item else {
            return Err(GatewayError::validation(
                "Lists may nest at most two levels deep",
            ));
        };
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        values.push(v.clone());
    }
    Ok(())
}

fn expand_identifier(param: &FormatParam, sql: &mut String) -> GatewayResult<()> {
    match param {
        FormatParam::Scalar(v) => sql.push_str(&quote_identifier(&identifier_text(v)?)?),
        FormatParam::List(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                let FormatParam::Scalar(v) = item else {
                    return Err(GatewayError::validation(
                        "'??' lists must contain only identifier names",
                    ));
                };
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&quote_identifier(&identifier_text(v)?)?);
            }
        }
        _ => {
            return Err(GatewayError::validation(
                "'??' expects an identifier name or a non-empty list of names",
            ));
        }
    }
    Ok(())
}

fn identifier_text(v: &SqlValue) -> GatewayResult<String> {
    match v {
        SqlValue::String(s) => Ok(s.clone()),
        SqlValue::Int(n) => Ok(n.to_string()),
        SqlValue::UInt(n) => Ok(n.to_string()),
        other => Err(GatewayError::validation(format!(
            "'??' expects an identifier name, got {}",
            other.type_name()
        ))),
    }
}
