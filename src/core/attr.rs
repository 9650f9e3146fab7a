//! Purpose: Tagged wire attribute values exchanged with the store.
//! Exports: `WireAttribute`, `WireItem`.
//! Role: Typed mirror of the attribute-value JSON shape; serializes byte-for-byte.
//! Invariants: Exactly one tag per value; tag names are fixed and case-sensitive.
//! Invariants: Binary payloads are base64 text on the wire.
use crate::core::error::{Error, ErrorKind};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub type WireItem = BTreeMap<String, WireAttribute>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireAttribute {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    SS(Vec<String>),
    NS(Vec<String>),
    BS(Vec<Vec<u8>>),
    L(Vec<WireAttribute>),
    M(WireItem),
}

impl WireAttribute {
    pub fn tag(&self) -> &'static str {
        match self {
            WireAttribute::S(_) => "S",
            WireAttribute::N(_) => "N",
            WireAttribute::B(_) => "B",
            WireAttribute::Bool(_) => "BOOL",
            WireAttribute::Null => "NULL",
            WireAttribute::SS(_) => "SS",
            WireAttribute::NS(_) => "NS",
            WireAttribute::BS(_) => "BS",
            WireAttribute::L(_) => "L",
            WireAttribute::M(_) => "M",
        }
    }

    /// True for an S/N/B holding an empty value or an SS/NS/BS holding no members.
    /// Such fields are dropped from encoded objects.
    pub fn is_empty_value(&self) -> bool {
        match self {
            WireAttribute::S(value) | WireAttribute::N(value) => value.is_empty(),
            WireAttribute::B(bytes) => bytes.is_empty(),
            WireAttribute::SS(values) | WireAttribute::NS(values) => values.is_empty(),
            WireAttribute::BS(values) => values.is_empty(),
            WireAttribute::Bool(_)
            | WireAttribute::Null
            | WireAttribute::L(_)
            | WireAttribute::M(_) => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            WireAttribute::S(value) => json!({ "S": value }),
            WireAttribute::N(value) => json!({ "N": value }),
            WireAttribute::B(bytes) => json!({ "B": BASE64.encode(bytes) }),
            WireAttribute::Bool(value) => json!({ "BOOL": value }),
            WireAttribute::Null => json!({ "NULL": true }),
            WireAttribute::SS(values) => json!({ "SS": values }),
            WireAttribute::NS(values) => json!({ "NS": values }),
            WireAttribute::BS(values) => {
                let encoded: Vec<String> = values.iter().map(|bytes| BASE64.encode(bytes)).collect();
                json!({ "BS": encoded })
            }
            WireAttribute::L(values) => {
                let encoded: Vec<Value> = values.iter().map(WireAttribute::to_json).collect();
                json!({ "L": encoded })
            }
            WireAttribute::M(map) => json!({ "M": wire_item_json(map) }),
        }
    }

    /// Strict parse of a single-tag attribute. Anything else is `UnknownWireType`.
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let Some(map) = value.as_object().filter(|map| map.len() == 1) else {
            return Err(unknown_shape(value));
        };
        let Some((tag, payload)) = map.iter().next() else {
            return Err(unknown_shape(value));
        };
        let attr = match (tag.as_str(), payload) {
            ("S", Value::String(value)) => WireAttribute::S(value.clone()),
            ("N", Value::String(value)) => WireAttribute::N(value.clone()),
            ("B", Value::String(value)) => WireAttribute::B(decode_base64(value)?),
            ("BOOL", Value::Bool(value)) => WireAttribute::Bool(*value),
            ("NULL", Value::Bool(true)) => WireAttribute::Null,
            ("SS", Value::Array(values)) => WireAttribute::SS(string_members(values, value)?),
            ("NS", Value::Array(values)) => WireAttribute::NS(string_members(values, value)?),
            ("BS", Value::Array(values)) => WireAttribute::BS(
                string_members(values, value)?
                    .iter()
                    .map(|member| decode_base64(member))
                    .collect::<Result<_, _>>()?,
            ),
            ("L", Value::Array(values)) => WireAttribute::L(
                values
                    .iter()
                    .map(WireAttribute::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            ("M", Value::Object(fields)) => WireAttribute::M(wire_item_from_json(fields)?),
            _ => return Err(unknown_shape(value)),
        };
        Ok(attr)
    }
}

pub fn wire_item_json(item: &WireItem) -> Map<String, Value> {
    item.iter()
        .map(|(key, attr)| (key.clone(), attr.to_json()))
        .collect()
}

pub fn wire_item_from_json(fields: &Map<String, Value>) -> Result<WireItem, Error> {
    fields
        .iter()
        .map(|(key, value)| {
            WireAttribute::from_json(value)
                .map(|attr| (key.clone(), attr))
                .map_err(|err| err.with_field(key.clone()))
        })
        .collect()
}

pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>, Error> {
    BASE64.decode(text).map_err(|err| {
        Error::new(ErrorKind::UnknownWireType)
            .with_message("binary value is not valid base64")
            .with_raw(text)
            .with_source(err)
    })
}

fn string_members(values: &[Value], whole: &Value) -> Result<Vec<String>, Error> {
    values
        .iter()
        .map(|member| {
            member
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| unknown_shape(whole))
        })
        .collect()
}

fn unknown_shape(value: &Value) -> Error {
    Error::new(ErrorKind::UnknownWireType)
        .with_message("value is not a single-tag wire attribute")
        .with_raw(value.to_string())
}
