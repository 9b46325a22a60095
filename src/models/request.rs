//! Typed gateway requests: upserts and queries.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use super::value::{BINARY_KEY, Row, SqlValue, base64_bytes};

/// One row, or an ordered batch of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowSet {
    One(Row),
    Many(Vec<Row>),
}

impl RowSet {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Self::One(row) => std::slice::from_ref(row),
            Self::Many(rows) => rows,
        }
    }
}

struct RowSetVisitor;

impl<'de> Visitor<'de> for RowSetVisitor {
    type Value = RowSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a row object or an array of row objects")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<RowSet, A::Error> {
        Row::deserialize(de::value::MapAccessDeserializer::new(map)).map(RowSet::One)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RowSet, A::Error> {
        let mut rows = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(row) = seq.next_element::<Row>()? {
            rows.push(row);
        }
        Ok(RowSet::Many(rows))
    }
}

impl<'de> Deserialize<'de> for RowSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RowSetVisitor)
    }
}

/// Insert-or-update of one or more rows into a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRequest {
    pub database: String,
    pub table: String,
    pub rows: RowSet,
}

/// A positional template parameter for `?` / `??` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatParam {
    Scalar(SqlValue),
    List(Vec<FormatParam>),
    Object(Row),
}

struct FormatParamVisitor;

impl<'de> Visitor<'de> for FormatParamVisitor {
    type Value = FormatParam;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar, an array or an object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(SqlValue::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(SqlValue::Null))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(SqlValue::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(SqlValue::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(
            i64::try_from(v).map_or(SqlValue::UInt(v), SqlValue::Int),
        ))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(SqlValue::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<FormatParam, E> {
        Ok(FormatParam::Scalar(SqlValue::String(v.to_string())))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FormatParam, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<FormatParam>()? {
            items.push(item);
        }
        Ok(FormatParam::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FormatParam, A::Error> {
        let mut pairs: Vec<(String, SqlValue)> = Vec::new();
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            if key == BINARY_KEY && pairs.is_empty() {
                let encoded: String = map.next_value()?;
                if map.next_key::<String>()?.is_some() {
                    return Err(de::Error::custom(
                        "binary values must contain only the \"$binary\" key",
                    ));
                }
                let bytes = base64_bytes::decode(&encoded).map_err(de::Error::custom)?;
                return Ok(FormatParam::Scalar(SqlValue::Bytes(bytes)));
            }
            if !seen.insert(key.clone()) {
                return Err(de::Error::custom(format!("duplicate key '{}'", key)));
            }
            pairs.push((key, map.next_value()?));
        }
        Row::from_pairs(pairs)
            .map(FormatParam::Object)
            .map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for FormatParam {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FormatParamVisitor)
    }
}

/// Per-request execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Statement timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Return binary columns as UTF-8 text when they decode cleanly.
    pub decode_binary: bool,
    /// Ask for a multi-statement batch; only honored when the server allows it.
    pub multiple_statements: bool,
}

impl QueryOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Structured query: SQL template plus positional parameters and options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredQuery {
    pub sql: String,
    pub format: Vec<FormatParam>,
    pub options: QueryOptions,
}

/// What to run: bare SQL text, or a template with parameters and options.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    Raw(String),
    Structured(StructuredQuery),
}

impl QuerySpec {
    pub fn sql(&self) -> &str {
        match self {
            Self::Raw(sql) => sql,
            Self::Structured(q) => &q.sql,
        }
    }

    pub fn format(&self) -> &[FormatParam] {
        match self {
            Self::Raw(_) => &[],
            Self::Structured(q) => &q.format,
        }
    }

    pub fn options(&self) -> QueryOptions {
        match self {
            Self::Raw(_) => QueryOptions::default(),
            Self::Structured(q) => q.options.clone(),
        }
    }
}

impl From<&str> for QuerySpec {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for QuerySpec {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

impl From<StructuredQuery> for QuerySpec {
    fn from(q: StructuredQuery) -> Self {
        Self::Structured(q)
    }
}

/// A query against one database.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub database: String,
    pub spec: QuerySpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rowset_single_object() {
        let set: RowSet = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(matches!(set, RowSet::One(_)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rowset_array() {
        let set: RowSet = serde_json::from_str(r#"[{"id": 1}, {"id": 2, "x": "y"}]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[1].len(), 2);
    }

    #[test]
    fn test_rowset_keeps_row_errors() {
        let err = serde_json::from_str::<RowSet>(r#"[{"id": 1, "id": 1}]"#).unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_rowset_rejects_scalar() {
        assert!(serde_json::from_str::<RowSet>("42").is_err());
    }

    #[test]
    fn test_format_params() {
        let params: Vec<FormatParam> =
            serde_json::from_str(r#"["users", [1, 2], {"a": 1}, {"$binary": "AA=="}, null]"#)
                .unwrap();
        assert_eq!(params[0], FormatParam::Scalar("users".into()));
        assert_eq!(
            params[1],
            FormatParam::List(vec![
                FormatParam::Scalar(SqlValue::Int(1)),
                FormatParam::Scalar(SqlValue::Int(2)),
            ])
        );
        assert!(matches!(params[2], FormatParam::Object(_)));
        assert_eq!(params[3], FormatParam::Scalar(SqlValue::Bytes(vec![0])));
        assert_eq!(params[4], FormatParam::Scalar(SqlValue::Null));
    }

    #[test]
    fn test_query_spec_accessors() {
        let raw = QuerySpec::from("SELECT 1");
        assert_eq!(raw.sql(), "SELECT 1");
        assert!(raw.format().is_empty());
        assert_eq!(raw.options(), QueryOptions::default());

        let structured = QuerySpec::from(StructuredQuery {
            sql: "SELECT ?".to_string(),
            format: vec![FormatParam::Scalar(SqlValue::Int(1))],
            options: QueryOptions {
                timeout_ms: Some(250),
                ..QueryOptions::default()
            },
        });
        assert_eq!(structured.format().len(), 1);
        assert_eq!(
            structured.options().timeout(),
            Some(Duration::from_millis(250))
        );
    }
}
