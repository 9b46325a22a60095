//! Statement results returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Result of a row-returning statement or a write summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// Row objects, columns in select-list order.
    Rows(Vec<serde_json::Map<String, JsonValue>>),
    Summary(StatementSummary),
}

impl QueryOutput {
    pub fn summary(rows_affected: u64, last_insert_id: u64) -> Self {
        Self::Summary(StatementSummary {
            rows_affected,
            last_insert_id,
        })
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Summary(_) => 0,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Summary(s) => Some(s.rows_affected),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSummary {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

/// Per-statement execution settings handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub timeout: Duration,
    pub decode_binary: bool,
}

impl RunOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            decode_binary: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_serialization() {
        let out = QueryOutput::summary(2, 17);
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"rows_affected": 2, "last_insert_id": 17})
        );
        assert_eq!(out.rows_affected(), Some(2));
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn test_rows_serialize_in_column_order() {
        let mut row = serde_json::Map::new();
        row.insert("z".to_string(), json!(1));
        row.insert("a".to_string(), json!("x"));
        let out = QueryOutput::Rows(vec![row]);
        assert_eq!(serde_json::to_string(&out).unwrap(), r#"[{"z":1,"a":"x"}]"#);
        assert_eq!(out.rows_affected(), None);
    }
}
