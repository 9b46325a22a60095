//! MySQL row to JSON conversion.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Per-category decoders handle the actual value extraction
//!
//! Exact numerics (DECIMAL) come back as strings so no precision is lost.
//! Binary columns come back as `{"$binary": "<base64>"}`, the same shape
//! accepted for binary values in requests.

use crate::models::value::{BINARY_KEY, base64_bytes};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    DateTime,
    Time,
    Unknown,
}

/// Classify a MySQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower == "year" || lower == "bit" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "datetime" | "timestamp" => return TypeCategory::DateTime,
        "time" => return TypeCategory::Time,
        _ => {}
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "geometry" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Decode binary data to JSON value.
///
/// If `decode_binary` is true and the bytes are valid UTF-8, returns the text.
/// Otherwise returns `{"$binary": "<base64>"}`.
pub fn decode_binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    if decode_binary {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return JsonValue::String(s.to_string());
        }
    }
    let mut map = serde_json::Map::with_capacity(1);
    map.insert(
        BINARY_KEY.to_string(),
        JsonValue::String(base64_bytes::encode(bytes)),
    );
    JsonValue::Object(map)
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map_with_options(&self, decode_binary: bool) -> serde_json::Map<String, JsonValue>;
}

impl RowToJson for MySqlRow {
    fn to_json_map_with_options(&self, decode_binary: bool) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name);
                let value = decode_column(self, idx, category, decode_binary);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Decoders
// =============================================================================

fn decode_column(
    row: &MySqlRow,
    idx: usize,
    category: TypeCategory,
    decode_binary: bool,
) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx, decode_binary),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Date => decode_date(row, idx),
        TypeCategory::DateTime => decode_datetime(row, idx),
        TypeCategory::Time => decode_time(row, idx),
        TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx, decode_binary),
    }
}

fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!("Failed to decode DECIMAL: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
    // Check NULL first
    if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Null;
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &MySqlRow, idx: usize, decode_binary: bool) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| decode_binary_value(&v, decode_binary))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<JsonValue>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

const ZERO_DATE: &str = "0000-00-00";
const ZERO_DATETIME: &str = "0000-00-00T00:00:00";

// Zero dates don't fit chrono. The binary protocol sends them as an empty
// value, the text protocol as the literal.
fn temporal_fallback(text: JsonValue, zero: &str) -> JsonValue {
    match text {
        JsonValue::String(s) if s.is_empty() => JsonValue::String(zero.to_string()),
        other => other,
    }
}

fn decode_date(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        Ok(Some(d)) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        Ok(None) => JsonValue::Null,
        Err(_) => temporal_fallback(decode_text(row, idx, false), ZERO_DATE),
    }
}

fn decode_datetime(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        Ok(Some(dt)) => JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Ok(None) => JsonValue::Null,
        Err(_) => temporal_fallback(decode_text(row, idx, false), ZERO_DATETIME),
    }
}

fn decode_time(row: &MySqlRow, idx: usize) -> JsonValue {
    // TIME can exceed 24h or be negative; those fall back to text.
    match row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        Ok(Some(t)) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
        Ok(None) => JsonValue::Null,
        Err(_) => decode_text(row, idx, false),
    }
}

fn decode_text(row: &MySqlRow, idx: usize, decode_binary: bool) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    // Text columns with a binary collation report as bytes.
    if let Ok(Some(v)) = row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
        return match String::from_utf8(v) {
            Ok(s) => JsonValue::String(s),
            Err(e) => decode_binary_value(e.as_bytes(), decode_binary),
        };
    }
    JsonValue::Null
}
