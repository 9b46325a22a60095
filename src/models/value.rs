//! Scalar column values and ordered rows.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Key marking a base64-encoded binary value: `{"$binary": "AAEC"}`.
pub const BINARY_KEY: &str = "$binary";

/// A single column value, always bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Only used for values above `i64::MAX`.
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Get the type name of this value for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::UInt(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Bytes(v) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BINARY_KEY, &base64_bytes::encode(v))?;
                map.end()
            }
        }
    }
}

struct SqlValueVisitor;

impl<'de> Visitor<'de> for SqlValueVisitor {
    type Value = SqlValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar column value or {\"$binary\": <base64>}")
    }

    fn visit_unit<E: de::Error>(self) -> Result<SqlValue, E> {
        Ok(SqlValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<SqlValue, E> {
        Ok(SqlValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<SqlValue, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<SqlValue, E> {
        Ok(SqlValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<SqlValue, E> {
        Ok(SqlValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<SqlValue, E> {
        Ok(i64::try_from(v).map_or(SqlValue::UInt(v), SqlValue::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<SqlValue, E> {
        Ok(SqlValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SqlValue, E> {
        Ok(SqlValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<SqlValue, E> {
        Ok(SqlValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> Result<SqlValue, A::Error> {
        Err(de::Error::custom("arrays are not valid column values"))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<SqlValue, A::Error> {
        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom("objects are not valid column values"));
        };
        if key != BINARY_KEY {
            return Err(de::Error::custom(format!(
                "objects are not valid column values (unexpected key '{}')",
                key
            )));
        }
        let encoded: String = map.next_value()?;
        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom(
                "binary values must contain only the \"$binary\" key",
            ));
        }
        base64_bytes::decode(&encoded)
            .map(SqlValue::Bytes)
            .map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SqlValueVisitor)
    }
}

/// One record: column name to value, in the order the caller supplied them.
///
/// Column names are non-empty and unique within a row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Build a row from pairs, enforcing non-empty, unique column names.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        let mut row = Row::default();
        let mut seen = HashSet::new();
        for (k, v) in pairs {
            let k = k.into();
            if k.is_empty() {
                return Err("column names must not be empty".to_string());
            }
            if !seen.insert(k.clone()) {
                return Err(format!("duplicate column '{}'", k));
            }
            row.columns.push((k, v.into()));
        }
        Ok(row)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (k, v) in &self.columns {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping column names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Row, A::Error> {
        let mut columns = Vec::with_capacity(map.size_hint().unwrap_or(0));
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            if key.is_empty() {
                return Err(de::Error::custom("column names must not be empty"));
            }
            if !seen.insert(key.clone()) {
                return Err(de::Error::custom(format!("duplicate column '{}'", key)));
            }
            let value: SqlValue = map.next_value()?;
            columns.push((key, value));
        }
        Ok(Row { columns })
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

/// Base64 helpers for binary values.
pub(crate) mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(s)
    }
}
