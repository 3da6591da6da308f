use std::collections::BTreeMap;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number};

use crate::error::CodecError;

/// Maximum nesting depth accepted on either side of the codec.
///
/// `Value` is an owned tree, so a literal reference cycle cannot exist in
/// Rust the way it can in a dynamically-typed source language. The practical
/// reading of "cycles in a value graph are rejected" for this representation
/// is a bound on recursion depth: anything deep enough to matter in practice
/// is either a mistake or an attack, and both are rejected the same way.
pub const MAX_DEPTH: usize = 64;

/// Tag key for a timestamp: `{ "$date": <ms since epoch> }`.
pub const TAG_DATE: &str = "$date";
/// Tag key for non-finite numbers: `{ "$InfNaN": 0 | 1 | -1 }`.
pub const TAG_INF_NAN: &str = "$InfNaN";
/// Tag key for binary data: `{ "$binary": <base64> }`.
pub const TAG_BINARY: &str = "$binary";
/// Tag keys for a regular expression: `{ "$regexp", "$flags" }`.
pub const TAG_REGEXP: &str = "$regexp";
pub const TAG_FLAGS: &str = "$flags";
/// Tag key that escapes an object whose own keys would otherwise be misread
/// as one of the tags above.
pub const TAG_ESCAPE: &str = "$escape";
/// Tag keys for a custom registered type: `{ "$type", "$value" }`.
pub const TAG_TYPE: &str = "$type";
pub const TAG_VALUE: &str = "$value";

/// A non-finite IEEE-754 number, carried out of band because JSON has no
/// literal for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonFinite {
    Nan,
    PosInfinity,
    NegInfinity,
}

impl NonFinite {
    fn tag_value(self) -> i64 {
        match self {
            NonFinite::Nan => 0,
            NonFinite::PosInfinity => 1,
            NonFinite::NegInfinity => -1,
        }
    }

    fn from_tag_value(v: i64) -> Result<Self, CodecError> {
        match v {
            0 => Ok(NonFinite::Nan),
            1 => Ok(NonFinite::PosInfinity),
            -1 => Ok(NonFinite::NegInfinity),
            other => Err(CodecError::Parse(format!(
                "invalid {TAG_INF_NAN} value: {other}"
            ))),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            NonFinite::Nan => f64::NAN,
            NonFinite::PosInfinity => f64::INFINITY,
            NonFinite::NegInfinity => f64::NEG_INFINITY,
        }
    }
}

/// A self-describing dynamic value carried across the wire.
///
/// Mirrors a JSON value but keeps rich types (dates, binary, regexes,
/// non-finite numbers, and application-registered custom types) distinct
/// instead of collapsing them into plain strings or numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(DateTime<Utc>),
    Regex { pattern: String, flags: String },
    NonFinite(NonFinite),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Custom { type_name: String, value: Box<Value> },
}

impl Value {
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn object(fields: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(fields.into_iter().collect())
    }

    /// Encode this value into a JSON-compatible `serde_json::Value`, tagging
    /// rich types as reserved single/double-key objects.
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> Result<serde_json::Value, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        let json = match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(CodecError::TooDeep)?,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => {
                let mut obj = Map::new();
                obj.insert(
                    TAG_BINARY.to_owned(),
                    serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
                );
                serde_json::Value::Object(obj)
            }
            Value::Date(dt) => {
                let mut obj = Map::new();
                obj.insert(
                    TAG_DATE.to_owned(),
                    serde_json::Value::Number(Number::from(dt.timestamp_millis())),
                );
                serde_json::Value::Object(obj)
            }
            Value::Regex { pattern, flags } => {
                let mut obj = Map::new();
                obj.insert(TAG_REGEXP.to_owned(), serde_json::Value::String(pattern.clone()));
                obj.insert(TAG_FLAGS.to_owned(), serde_json::Value::String(flags.clone()));
                serde_json::Value::Object(obj)
            }
            Value::NonFinite(kind) => {
                let mut obj = Map::new();
                obj.insert(
                    TAG_INF_NAN.to_owned(),
                    serde_json::Value::Number(Number::from(kind.tag_value())),
                );
                serde_json::Value::Object(obj)
            }
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json_depth(depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => {
                let mut obj = Map::new();
                for (k, v) in fields {
                    obj.insert(k.clone(), v.to_json_depth(depth + 1)?);
                }
                let json_obj = serde_json::Value::Object(obj);
                if looks_like_tag(json_obj.as_object().expect("just built as object")) {
                    let mut escape = Map::new();
                    escape.insert(TAG_ESCAPE.to_owned(), json_obj);
                    serde_json::Value::Object(escape)
                } else {
                    json_obj
                }
            }
            Value::Custom { type_name, value } => {
                let mut obj = Map::new();
                obj.insert(TAG_TYPE.to_owned(), serde_json::Value::String(type_name.clone()));
                obj.insert(TAG_VALUE.to_owned(), value.to_json_depth(depth + 1)?);
                serde_json::Value::Object(obj)
            }
        };
        Ok(json)
    }

    /// Decode a JSON-compatible `serde_json::Value` back into a `Value`,
    /// inverting the tagging performed by [`Value::to_json`].
    pub fn from_json(json: &serde_json::Value) -> Result<Value, CodecError> {
        Self::from_json_depth(json, 0)
    }

    fn from_json_depth(json: &serde_json::Value, depth: usize) -> Result<Value, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        let value = match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    return Err(CodecError::Parse(format!("unrepresentable number: {n}")));
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| Self::from_json_depth(v, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(obj) => {
                if let Some(tagged) = decode_tag(obj, depth)? {
                    tagged
                } else {
                    let mut fields = BTreeMap::new();
                    for (k, v) in obj {
                        fields.insert(k.clone(), Self::from_json_depth(v, depth + 1)?);
                    }
                    Value::Object(fields)
                }
            }
        };
        Ok(value)
    }
}

/// True if a JSON object's shape exactly matches one of the reserved tag
/// shapes and would therefore be misread as a rich type on decode.
fn looks_like_tag(obj: &Map<String, serde_json::Value>) -> bool {
    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    matches!(
        keys.as_slice(),
        [TAG_DATE] | [TAG_INF_NAN] | [TAG_BINARY] | [TAG_ESCAPE]
    ) || matches!(keys.as_slice(), [a, b] | [b, a] if *a == TAG_REGEXP && *b == TAG_FLAGS)
        || matches!(keys.as_slice(), [a, b] | [b, a] if *a == TAG_TYPE && *b == TAG_VALUE)
}

fn decode_tag(
    obj: &Map<String, serde_json::Value>,
    depth: usize,
) -> Result<Option<Value>, CodecError> {
    if obj.len() == 1 {
        if let Some(v) = obj.get(TAG_DATE) {
            let ms = v
                .as_i64()
                .ok_or_else(|| CodecError::Parse(format!("{TAG_DATE} must be an integer")))?;
            let dt = DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| CodecError::Parse(format!("{TAG_DATE} out of range")))?;
            return Ok(Some(Value::Date(dt)));
        }
        if let Some(v) = obj.get(TAG_INF_NAN) {
            let raw = v
                .as_i64()
                .ok_or_else(|| CodecError::Parse(format!("{TAG_INF_NAN} must be an integer")))?;
            return Ok(Some(Value::NonFinite(NonFinite::from_tag_value(raw)?)));
        }
        if let Some(v) = obj.get(TAG_BINARY) {
            let encoded = v
                .as_str()
                .ok_or_else(|| CodecError::Parse(format!("{TAG_BINARY} must be a string")))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| CodecError::Parse(format!("invalid base64 in {TAG_BINARY}: {e}")))?;
            return Ok(Some(Value::Bytes(bytes)));
        }
        if let Some(v) = obj.get(TAG_ESCAPE) {
            let serde_json::Value::Object(inner) = v else {
                return Err(CodecError::Parse(format!("{TAG_ESCAPE} must wrap an object")));
            };
            let mut fields = BTreeMap::new();
            for (k, fv) in inner {
                fields.insert(k.clone(), Value::from_json_depth(fv, depth + 1)?);
            }
            return Ok(Some(Value::Object(fields)));
        }
    }
    if obj.len() == 2 {
        if let (Some(pattern), Some(flags)) = (obj.get(TAG_REGEXP), obj.get(TAG_FLAGS)) {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| CodecError::Parse(format!("{TAG_REGEXP} must be a string")))?
                .to_owned();
            let flags = flags
                .as_str()
                .ok_or_else(|| CodecError::Parse(format!("{TAG_FLAGS} must be a string")))?
                .to_owned();
            // Validate the pattern compiles; the flags themselves are carried
            // through opaquely since the regex crate has no single "flags"
            // string knob to invert against.
            regex::Regex::new(&pattern)
                .map_err(|e| CodecError::Parse(format!("invalid {TAG_REGEXP}: {e}")))?;
            return Ok(Some(Value::Regex { pattern, flags }));
        }
        if let (Some(type_name), Some(inner)) = (obj.get(TAG_TYPE), obj.get(TAG_VALUE)) {
            let type_name = type_name
                .as_str()
                .ok_or_else(|| CodecError::Parse(format!("{TAG_TYPE} must be a string")))?
                .to_owned();
            let value = Value::from_json_depth(inner, depth + 1)?;
            return Ok(Some(Value::Custom {
                type_name,
                value: Box::new(value),
            }));
        }
    }
    Ok(None)
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        v.to_json().unwrap_or(serde_json::Value::Null)
    }
}
