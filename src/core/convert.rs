//! Purpose: Convert between native values and tagged wire attributes.
//! Exports: `ConversionOptions`, `encode`, `encode_object`, `decode`, `decode_object`,
//! `encode_request`, `decode_response`, `number_to_string`.
//! Role: The only place where native values cross into (and out of) wire form.
//! Invariants: Options are passed explicitly through every recursive call.
//! Invariants: Numbers cross the wire as finite decimal strings.
//! Invariants: Decoding is permissive inside objects so partially-encoded data survives.
use crate::core::attr::{WireAttribute, WireItem, decode_base64, wire_item_json};
use crate::core::error::{Error, ErrorKind};
use crate::core::set::{SetType, TypedSet};
use crate::core::value::{Item, NativeValue};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;

/// Parameters whose entries are per-attribute conditions
/// (`{ attr: { ComparisonOperator, AttributeValueList | Value } }`).
const CONDITION_PARAMS: [&str; 4] = ["Expected", "KeyConditions", "QueryFilter", "ScanFilter"];

/// Empty string/binary policy. `convert_empty_values` wins when both are set;
/// with neither set an empty value is an error.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConversionOptions {
    pub remove_empty_values: bool,
    pub convert_empty_values: bool,
}

impl ConversionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_empty_values(mut self, enabled: bool) -> Self {
        self.remove_empty_values = enabled;
        self
    }

    pub fn convert_empty_values(mut self, enabled: bool) -> Self {
        self.convert_empty_values = enabled;
        self
    }
}

pub fn encode(
    value: &NativeValue,
    key: &str,
    options: ConversionOptions,
) -> Result<Option<WireAttribute>, Error> {
    let attr = match value {
        NativeValue::Undefined | NativeValue::Null => return as_empty(key, options),
        NativeValue::String(text) if text.is_empty() => return as_empty(key, options),
        NativeValue::String(text) => WireAttribute::S(text.clone()),
        NativeValue::Bool(flag) => WireAttribute::Bool(*flag),
        NativeValue::Number(number) => WireAttribute::N(number_to_string(key, *number)?),
        NativeValue::Function => return Ok(None),
        NativeValue::Binary(bytes) if bytes.is_empty() => return as_empty(key, options),
        NativeValue::Binary(bytes) => WireAttribute::B(bytes.clone()),
        NativeValue::Set(set) => encode_set(set, key)?,
        NativeValue::List(values) => {
            let mut encoded = Vec::with_capacity(values.len());
            for (index, element) in values.iter().enumerate() {
                if let Some(attr) = encode(element, &index.to_string(), options)? {
                    encoded.push(attr);
                }
            }
            WireAttribute::L(encoded)
        }
        NativeValue::Map(map) => WireAttribute::M(encode_object(map, options)?),
        NativeValue::Timestamp(ts) => return Ok(ts.format(&Rfc3339).ok().and_then(text_attr)),
        NativeValue::Opaque(json) => {
            let text = serde_json::to_string(json).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to serialize value")
                    .with_field(key)
                    .with_source(err)
            })?;
            return Ok(text_attr(text));
        }
    };
    Ok(Some(attr))
}

pub fn encode_object(map: &Item, options: ConversionOptions) -> Result<WireItem, Error> {
    let mut out = WireItem::new();
    for (key, value) in map {
        if let Some(attr) = encode(value, key, options)? {
            if !attr.is_empty_value() {
                out.insert(key.clone(), attr);
            }
        }
    }
    Ok(out)
}

pub fn decode(value: &Value, key: &str, permissive: bool) -> Result<NativeValue, Error> {
    if let Value::Object(map) = value {
        if let Some(text) = tagged(map, "S") {
            return text
                .as_str()
                .map(NativeValue::from)
                .ok_or_else(|| unknown_wire_type(key, value));
        }
        if let Some(number) = tagged(map, "N") {
            return parse_number(key, number).map(NativeValue::Number);
        }
        if let Some(bytes) = tagged(map, "B") {
            let text = bytes.as_str().ok_or_else(|| unknown_wire_type(key, value))?;
            return decode_base64(text)
                .map(NativeValue::Binary)
                .map_err(|err| err.with_field(key));
        }
        if let Some(members) = tagged(map, "SS") {
            let members = string_members(key, members, value)?;
            return Ok(NativeValue::Set(TypedSet::from_strings(members)?));
        }
        if let Some(members) = tagged(map, "NS") {
            let members = members.as_array().ok_or_else(|| unknown_wire_type(key, value))?;
            let numbers = members
                .iter()
                .map(|member| parse_number(key, member))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(NativeValue::Set(TypedSet::from_numbers(numbers)?));
        }
        if let Some(members) = tagged(map, "BS") {
            let binaries = string_members(key, members, value)?
                .iter()
                .map(|member| decode_base64(member).map_err(|err| err.with_field(key)))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(NativeValue::Set(TypedSet::from_binaries(binaries)?));
        }
        if let Some(elements) = tagged(map, "L") {
            let elements = elements.as_array().ok_or_else(|| unknown_wire_type(key, value))?;
            let decoded = elements
                .iter()
                .enumerate()
                .map(|(index, element)| decode(element, &index.to_string(), true))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(NativeValue::List(decoded));
        }
        if let Some(flag) = tagged(map, "BOOL") {
            return flag
                .as_bool()
                .map(NativeValue::Bool)
                .ok_or_else(|| unknown_wire_type(key, value));
        }
        if map.get("NULL").and_then(Value::as_bool) == Some(true) {
            return Ok(NativeValue::Null);
        }
        if let Some(Value::Object(fields)) = tagged(map, "M") {
            return decode_object(fields).map(NativeValue::Map);
        }
    }

    if !permissive {
        return Err(unknown_wire_type(key, value));
    }
    match value {
        Value::Object(fields) => decode_object(fields).map(NativeValue::Map),
        Value::Array(elements) => elements
            .iter()
            .enumerate()
            .map(|(index, element)| decode(element, &index.to_string(), true))
            .collect::<Result<Vec<_>, _>>()
            .map(NativeValue::List),
        scalar => Ok(NativeValue::from_json(scalar)),
    }
}

pub fn decode_object(map: &Map<String, Value>) -> Result<Item, Error> {
    let mut out = Item::new();
    for (key, value) in map {
        let decoded = decode(value, key, true)?;
        if decoded != NativeValue::Undefined {
            out.insert(key.clone(), decoded);
        }
    }
    Ok(out)
}

/// Build wire parameters: `item_fields` are encoded as attribute maps, condition
/// parameters have their operands encoded, everything else is plain JSON.
pub fn encode_request(
    params: &Item,
    item_fields: &[&str],
    options: ConversionOptions,
) -> Result<Map<String, Value>, Error> {
    let mut out = Map::new();
    for (key, value) in params {
        if *value == NativeValue::Undefined {
            continue;
        }
        let encoded = if item_fields.contains(&key.as_str()) {
            match value {
                NativeValue::Map(map) => Value::Object(wire_item_json(&encode_object(map, options)?)),
                NativeValue::Null => Value::Null,
                other => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("parameter must be a map of attributes")
                        .with_field(key.clone())
                        .with_raw(other.kind_name()));
                }
            }
        } else if CONDITION_PARAMS.contains(&key.as_str()) {
            encode_conditions(value, options)?
        } else {
            value.to_json()
        };
        out.insert(key.clone(), encoded);
    }
    Ok(out)
}

/// Decode a whole result object, or each element of an array of result objects.
pub fn decode_response(value: &Value) -> Result<NativeValue, Error> {
    match value {
        Value::Object(map) => decode_object(map).map(NativeValue::Map),
        Value::Array(elements) => elements
            .iter()
            .map(decode_response)
            .collect::<Result<Vec<_>, _>>()
            .map(NativeValue::List),
        scalar => Ok(NativeValue::from_json(scalar)),
    }
}

/// Decimal form of a finite number; `-0` is written as `0`.
pub fn number_to_string(key: &str, number: f64) -> Result<String, Error> {
    if !number.is_finite() {
        let raw = if number.is_nan() {
            "NaN"
        } else if number > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        };
        return Err(Error::new(ErrorKind::InvalidNumber)
            .with_message("cannot convert attribute to a number")
            .with_field(key)
            .with_raw(raw));
    }
    if number == 0.0 {
        return Ok("0".to_string());
    }
    Ok(format!("{number}"))
}

fn as_empty(key: &str, options: ConversionOptions) -> Result<Option<WireAttribute>, Error> {
    if options.convert_empty_values {
        return Ok(Some(WireAttribute::Null));
    }
    if options.remove_empty_values {
        return Ok(None);
    }
    Err(Error::new(ErrorKind::EmptyValue)
        .with_message(format!(
            "empty string and binary values are invalid; {key} was empty"
        ))
        .with_field(key)
        .with_hint("Enable remove_empty_values or convert_empty_values to handle empty values."))
}

fn encode_set(set: &TypedSet, key: &str) -> Result<WireAttribute, Error> {
    let members = set.values();
    let attr = match set.member_type() {
        SetType::String => WireAttribute::SS(
            members
                .iter()
                .map(|member| match member {
                    NativeValue::String(text) => Ok(text.clone()),
                    NativeValue::Number(number) => number_to_string(key, *number),
                    other => Err(mismatched_member(key, SetType::String, other)),
                })
                .collect::<Result<_, _>>()?,
        ),
        SetType::Number => WireAttribute::NS(
            members
                .iter()
                .map(|member| match member {
                    NativeValue::Number(number) => number_to_string(key, *number),
                    NativeValue::String(text) => {
                        let number = text.trim().parse::<f64>().map_err(|_| {
                            Error::new(ErrorKind::InvalidNumber)
                                .with_message("cannot convert attribute to a number")
                                .with_field(key)
                                .with_raw(text.clone())
                        })?;
                        number_to_string(key, number)
                    }
                    other => Err(mismatched_member(key, SetType::Number, other)),
                })
                .collect::<Result<_, _>>()?,
        ),
        SetType::Binary => WireAttribute::BS(
            members
                .iter()
                .map(|member| match member {
                    NativeValue::Binary(bytes) => Ok(bytes.clone()),
                    NativeValue::String(text) => Ok(text.as_bytes().to_vec()),
                    other => Err(mismatched_member(key, SetType::Binary, other)),
                })
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(attr)
}

fn encode_conditions(value: &NativeValue, options: ConversionOptions) -> Result<Value, Error> {
    let Some(conditions) = value.as_map() else {
        return Ok(value.to_json());
    };
    let mut out = Map::new();
    for (attr_name, condition) in conditions {
        let Some(fields) = condition.as_map() else {
            out.insert(attr_name.clone(), condition.to_json());
            continue;
        };
        let mut encoded = Map::new();
        for (field, operand) in fields {
            match (field.as_str(), operand) {
                ("Value", operand) => {
                    if let Some(attr) = encode(operand, attr_name, options)? {
                        encoded.insert(field.clone(), attr.to_json());
                    }
                }
                ("AttributeValueList", NativeValue::List(operands)) => {
                    let mut list = Vec::with_capacity(operands.len());
                    for operand in operands {
                        if let Some(attr) = encode(operand, attr_name, options)? {
                            list.push(attr.to_json());
                        }
                    }
                    encoded.insert(field.clone(), Value::Array(list));
                }
                (_, other) => {
                    encoded.insert(field.clone(), other.to_json());
                }
            }
        }
        out.insert(attr_name.clone(), Value::Object(encoded));
    }
    Ok(Value::Object(out))
}

fn text_attr(text: String) -> Option<WireAttribute> {
    if text.is_empty() {
        None
    } else {
        Some(WireAttribute::S(text))
    }
}

fn tagged<'a>(map: &'a Map<String, Value>, tag: &str) -> Option<&'a Value> {
    map.get(tag).filter(|value| !value.is_null())
}

fn parse_number(key: &str, value: &Value) -> Result<f64, Error> {
    let parsed = match value {
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite()).ok_or_else(|| {
        Error::new(ErrorKind::InvalidNumber)
            .with_message("wire number is not a finite decimal")
            .with_field(key)
            .with_raw(value.to_string())
    })
}

fn string_members(key: &str, members: &Value, whole: &Value) -> Result<Vec<String>, Error> {
    let members = members.as_array().ok_or_else(|| unknown_wire_type(key, whole))?;
    members
        .iter()
        .map(|member| {
            member
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| unknown_wire_type(key, whole))
        })
        .collect()
}

fn unknown_wire_type(key: &str, value: &Value) -> Error {
    Error::new(ErrorKind::UnknownWireType)
        .with_message(format!("unknown wire type for \"{key}\""))
        .with_field(key)
        .with_raw(value.to_string())
}

fn mismatched_member(key: &str, member_type: SetType, found: &NativeValue) -> Error {
    Error::new(ErrorKind::InvalidSetType)
        .with_message(format!(
            "{} set contains a {} member",
            member_type.as_str(),
            found.kind_name()
        ))
        .with_field(key)
}
