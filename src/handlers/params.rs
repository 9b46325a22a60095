//! Request parameter extraction.
//!
//! Parameters arrive in the query string, a JSON object body, or a
//! form-urlencoded body. They are merged into one [`RequestParams`] with
//! query-string values taking precedence over body values, then turned into
//! typed requests.
//!
//! JSON values are kept as raw text until their target type is known, so
//! `row` objects are deserialized straight from the request bytes and
//! duplicate column names are still caught.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{
    FormatParam, QueryOptions, QueryRequest, QuerySpec, RowSet, SqlValue, StructuredQuery,
    UpsertRequest,
};
use axum::body::Bytes;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::collections::HashMap;

/// Raw pieces of an HTTP request that carry parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestInput {
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A single parameter value before it is interpreted.
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// Value taken from a JSON body.
    Json(Box<RawValue>),
    /// Value taken from a query string or form body.
    Text(String),
    /// Repeated query-string or form key (`k=a&k=b` or `k[]=a&k[]=b`).
    List(Vec<String>),
}

/// Merged request parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    values: HashMap<String, ParamValue>,
}

impl RequestParams {
    /// Merge the query string and body. Query-string values win.
    pub fn from_parts(
        query: Option<&str>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> GatewayResult<Self> {
        let mut params = Self::from_body(content_type, body)?;
        if let Some(query) = query {
            for (key, value) in parse_form(query.as_bytes()) {
                params.values.insert(key, value);
            }
        }
        Ok(params)
    }

    pub fn from_input(input: &RequestInput) -> GatewayResult<Self> {
        Self::from_parts(
            input.query.as_deref(),
            input.content_type.as_deref(),
            &input.body,
        )
    }

    fn from_body(content_type: Option<&str>, body: &[u8]) -> GatewayResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase());
        let is_json = match mime.as_deref() {
            Some("application/x-www-form-urlencoded") => false,
            Some(m) if m == "application/json" || m.ends_with("+json") => true,
            // No usable content type: sniff
            Some("text/plain") | None => body.trim_ascii_start().starts_with(b"{"),
            Some(other) => {
                return Err(GatewayError::validation(format!(
                    "Unsupported content type '{}': use application/json or application/x-www-form-urlencoded",
                    other
                )));
            }
        };

        if is_json {
            let object: HashMap<String, Box<RawValue>> = serde_json::from_slice(body)
                .map_err(|e| {
                    GatewayError::validation(format!("Request body must be a JSON object: {}", e))
                })?;
            Ok(Self {
                values: object
                    .into_iter()
                    .map(|(k, v)| (k, ParamValue::Json(v)))
                    .collect(),
            })
        } else {
            Ok(Self {
                values: parse_form(body).into_iter().collect(),
            })
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set to something other than JSON `null`.
    fn is_present(&self, key: &str) -> bool {
        match self.values.get(key) {
            None => false,
            Some(ParamValue::Json(raw)) => raw.get().trim() != "null",
            Some(_) => true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// A string parameter. JSON numbers are accepted as their text.
    pub fn string(&self, key: &str) -> GatewayResult<Option<String>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ParamValue::Text(s)) => Ok(Some(s.clone())),
            Some(ParamValue::Json(raw)) => match serde_json::from_str(raw.get()) {
                Ok(serde_json::Value::String(s)) => Ok(Some(s)),
                Ok(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
                Ok(serde_json::Value::Null) => Ok(None),
                _ => Err(type_error(key, "a string")),
            },
            Some(ParamValue::List(_)) => Err(type_error(key, "a single value")),
        }
    }

    /// A required, non-empty string parameter.
    pub fn required_string(&self, key: &str) -> GatewayResult<String> {
        match self.string(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(GatewayError::validation(format!(
                "Missing required parameter: {}",
                key
            ))),
        }
    }

    /// A parameter holding JSON. Text values are parsed as JSON; repeated
    /// keys become an array of strings.
    pub fn json<T: DeserializeOwned>(&self, key: &str) -> GatewayResult<Option<T>> {
        let parsed = match self.values.get(key) {
            None => return Ok(None),
            Some(ParamValue::Json(raw)) => serde_json::from_str(raw.get()),
            Some(ParamValue::Text(s)) => serde_json::from_str(s),
            Some(ParamValue::List(items)) => serde_json::from_value(serde_json::Value::from(
                items.clone(),
            )),
        };
        parsed
            .map(Some)
            .map_err(|e| GatewayError::validation(format!("Invalid '{}': {}", key, e)))
    }

    /// A boolean flag: JSON booleans, `true`/`false`, `1`/`0`.
    pub fn bool(&self, key: &str) -> GatewayResult<Option<bool>> {
        let text = match self.values.get(key) {
            None => return Ok(None),
            Some(ParamValue::Text(s)) => s.trim().to_ascii_lowercase(),
            Some(ParamValue::Json(raw)) => match serde_json::from_str(raw.get()) {
                Ok(serde_json::Value::Bool(b)) => return Ok(Some(b)),
                Ok(serde_json::Value::Null) => return Ok(None),
                Ok(serde_json::Value::Number(n)) => n.to_string(),
                Ok(serde_json::Value::String(s)) => s.trim().to_ascii_lowercase(),
                _ => return Err(type_error(key, "a boolean")),
            },
            Some(ParamValue::List(_)) => return Err(type_error(key, "a single value")),
        };
        match text.as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(type_error(key, "a boolean")),
        }
    }

    /// A non-negative integer, as a JSON number or numeric string.
    pub fn u64(&self, key: &str) -> GatewayResult<Option<u64>> {
        let text = match self.values.get(key) {
            None => return Ok(None),
            Some(ParamValue::Text(s)) => s.trim().to_string(),
            Some(ParamValue::Json(raw)) => match serde_json::from_str(raw.get()) {
                Ok(serde_json::Value::Number(n)) => n.to_string(),
                Ok(serde_json::Value::String(s)) => s.trim().to_string(),
                Ok(serde_json::Value::Null) => return Ok(None),
                _ => return Err(type_error(key, "a non-negative integer")),
            },
            Some(ParamValue::List(_)) => return Err(type_error(key, "a single value")),
        };
        text.parse::<u64>()
            .map(Some)
            .map_err(|_| type_error(key, "a non-negative integer"))
    }

    /// Build an upsert request. `row` wins when both `row` and `rows` are set;
    /// a `null` counts as unset.
    pub fn upsert_request(&self) -> GatewayResult<UpsertRequest> {
        let database = self.required_string("database")?;
        let table = self.required_string("table")?;
        let key = if self.is_present("row") {
            "row"
        } else if self.is_present("rows") {
            "rows"
        } else {
            return Err(GatewayError::validation(
                "Missing required parameter: row or rows",
            ));
        };
        let rows: RowSet = self
            .json(key)?
            .ok_or_else(|| GatewayError::validation("Missing required parameter: row or rows"))?;

        Ok(UpsertRequest {
            database,
            table,
            rows,
        })
    }

    /// Build a query request.
    pub fn query_request(&self) -> GatewayResult<QueryRequest> {
        let database = self.required_string("database")?;
        let sql = self.required_string("sql")?;

        let format = self.format_params()?;
        let options = QueryOptions {
            timeout_ms: self.u64("timeout")?,
            decode_binary: self.bool("decode_binary")?.unwrap_or(false),
            multiple_statements: self.bool("multiple_statements")?.unwrap_or(false),
        };

        let spec = match format {
            None if options == QueryOptions::default() => QuerySpec::Raw(sql),
            format => QuerySpec::Structured(StructuredQuery {
                sql,
                format: format.unwrap_or_default(),
                options,
            }),
        };
        Ok(QueryRequest { database, spec })
    }

    /// Positional template parameters from `format` (or its alias `values`).
    ///
    /// A JSON array is the parameter list. Any other JSON value is a single
    /// parameter. Text starting with `[` is parsed as JSON; other text is one
    /// string parameter.
    fn format_params(&self) -> GatewayResult<Option<Vec<FormatParam>>> {
        let key = if self.contains("format") {
            "format"
        } else if self.contains("values") {
            "values"
        } else {
            return Ok(None);
        };

        let params = match self.values.get(key) {
            Some(ParamValue::Text(s)) if !s.trim_start().starts_with('[') => {
                vec![FormatParam::Scalar(SqlValue::String(s.clone()))]
            }
            Some(ParamValue::List(items)) => items
                .iter()
                .map(|s| FormatParam::Scalar(SqlValue::String(s.clone())))
                .collect(),
            _ => match self.json::<FormatParam>(key)? {
                Some(FormatParam::List(items)) => items,
                Some(single) => vec![single],
                None => Vec::new(),
            },
        };
        Ok(Some(params))
    }
}

fn type_error(key: &str, expected: &str) -> GatewayError {
    GatewayError::validation(format!("Parameter '{}' must be {}", key, expected))
}

/// Parse `application/x-www-form-urlencoded` pairs. Repeated keys and keys
/// ending in `[]` collect into lists.
fn parse_form(input: &[u8]) -> Vec<(String, ParamValue)> {
    let mut out: Vec<(String, ParamValue)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        let (key, forced_list) = match key.strip_suffix("[]") {
            Some(stripped) => (stripped.to_string(), true),
            None => (key.into_owned(), false),
        };
        let value = value.into_owned();

        match out.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                if let ParamValue::Text(first) = existing {
                    let first = std::mem::take(first);
                    *existing = ParamValue::List(vec![first]);
                }
                if let ParamValue::List(items) = existing {
                    items.push(value);
                }
            }
            None if forced_list => out.push((key, ParamValue::List(vec![value]))),
            None => out.push((key, ParamValue::Text(value))),
        }
    }
    out
}
