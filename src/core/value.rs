//! Purpose: Dynamic native value model used by callers and decoded responses.
//! Exports: `NativeValue`, `Item`.
//! Role: Closed sum type over every value shape the converter understands.
//! Invariants: Maps iterate in key order; lists keep insertion order.
//! Invariants: `Undefined` is the absent sentinel and never reaches the wire.
use crate::core::set::TypedSet;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A record or key: attribute name to value.
pub type Item = BTreeMap<String, NativeValue>;

// Integers up to 2^53 survive an f64 round trip exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    Undefined,
    Null,
    String(String),
    Number(f64),
    Bool(bool),
    Binary(Vec<u8>),
    Set(TypedSet),
    List(Vec<NativeValue>),
    Map(Item),
    /// Callable placeholder; dropped on encode.
    Function,
    /// Date-like value; encodes through its RFC 3339 form.
    Timestamp(OffsetDateTime),
    /// Any other JSON-shaped value; encodes as its JSON text.
    Opaque(Value),
}

impl NativeValue {
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        NativeValue::Binary(bytes.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NativeValue::Undefined => "undefined",
            NativeValue::Null => "null",
            NativeValue::String(_) => "string",
            NativeValue::Number(_) => "number",
            NativeValue::Bool(_) => "boolean",
            NativeValue::Binary(_) => "binary",
            NativeValue::Set(_) => "set",
            NativeValue::List(_) => "list",
            NativeValue::Map(_) => "map",
            NativeValue::Function => "function",
            NativeValue::Timestamp(_) => "timestamp",
            NativeValue::Opaque(_) => "opaque",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Item> {
        match self {
            NativeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<Item> {
        match self {
            NativeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Interpret plain (untagged) JSON as a native value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => NativeValue::Null,
            Value::Bool(value) => NativeValue::Bool(*value),
            Value::Number(number) => NativeValue::Number(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(value) => NativeValue::String(value.clone()),
            Value::Array(values) => NativeValue::List(values.iter().map(Self::from_json).collect()),
            Value::Object(map) => NativeValue::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Render as plain JSON. Binary becomes base64 text, sets become arrays,
    /// timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            NativeValue::Undefined | NativeValue::Null | NativeValue::Function => Value::Null,
            NativeValue::String(value) => Value::String(value.clone()),
            NativeValue::Number(value) => number_json(*value),
            NativeValue::Bool(value) => Value::Bool(*value),
            NativeValue::Binary(bytes) => Value::String(BASE64.encode(bytes)),
            NativeValue::Set(set) => Value::Array(set.values().iter().map(Self::to_json).collect()),
            NativeValue::List(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            NativeValue::Map(map) => Value::Object(item_json(map)),
            NativeValue::Timestamp(ts) => ts
                .format(&Rfc3339)
                .map(Value::String)
                .unwrap_or(Value::Null),
            NativeValue::Opaque(value) => value.clone(),
        }
    }
}

/// Build an `Item` from `(name, value)` pairs.
pub fn item_from<I, K, V>(fields: I) -> Item
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<NativeValue>,
{
    fields
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

pub fn item_json(item: &Item) -> Map<String, Value> {
    item.iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

fn number_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        return Value::from(value as i64);
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        NativeValue::String(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        NativeValue::String(value)
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        NativeValue::Number(value)
    }
}

impl From<i32> for NativeValue {
    fn from(value: i32) -> Self {
        NativeValue::Number(f64::from(value))
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        NativeValue::Number(value as f64)
    }
}

impl From<u64> for NativeValue {
    fn from(value: u64) -> Self {
        NativeValue::Number(value as f64)
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        NativeValue::Bool(value)
    }
}

impl From<TypedSet> for NativeValue {
    fn from(value: TypedSet) -> Self {
        NativeValue::Set(value)
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(values: Vec<NativeValue>) -> Self {
        NativeValue::List(values)
    }
}

impl From<Item> for NativeValue {
    fn from(map: Item) -> Self {
        NativeValue::Map(map)
    }
}

impl From<OffsetDateTime> for NativeValue {
    fn from(value: OffsetDateTime) -> Self {
        NativeValue::Timestamp(value)
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(NativeValue::Null)
    }
}
