//! Purpose: Homogeneous set values (string, number, or binary members).
//! Exports: `TypedSet`, `SetType`.
//! Role: First-class native value variant that encodes to `SS`/`NS`/`BS`.
//! Invariants: Member type is classified from the first element and never changes.
//! Invariants: Empty sets cannot be constructed; the wire protocol has no empty set.
//! Notes: Only the first element is classified. Callers are expected to supply
//! homogeneous data; mismatched later members surface at encode time instead.
use crate::core::error::{Error, ErrorKind};
use crate::core::value::NativeValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetType {
    String,
    Number,
    Binary,
}

impl SetType {
    pub fn as_str(self) -> &'static str {
        match self {
            SetType::String => "String",
            SetType::Number => "Number",
            SetType::Binary => "Binary",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypedSet {
    values: Vec<NativeValue>,
    member_type: SetType,
}

impl TypedSet {
    pub fn new(values: Vec<NativeValue>) -> Result<Self, Error> {
        let member_type = detect_type(&values)?;
        Ok(Self {
            values,
            member_type,
        })
    }

    pub fn from_strings<I, S>(values: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            values
                .into_iter()
                .map(|value| NativeValue::String(value.into()))
                .collect(),
        )
    }

    pub fn from_numbers<I>(values: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = f64>,
    {
        Self::new(values.into_iter().map(NativeValue::Number).collect())
    }

    pub fn from_binaries<I, B>(values: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self::new(
            values
                .into_iter()
                .map(|value| NativeValue::Binary(value.into()))
                .collect(),
        )
    }

    pub fn member_type(&self) -> SetType {
        self.member_type
    }

    pub fn values(&self) -> &[NativeValue] {
        &self.values
    }

}

impl TryFrom<NativeValue> for TypedSet {
    type Error = Error;

    fn try_from(value: NativeValue) -> Result<Self, Self::Error> {
        match value {
            NativeValue::List(values) => Self::new(values),
            NativeValue::Set(set) => Ok(set),
            other => Err(invalid_set_type(other.kind_name())),
        }
    }
}

fn detect_type(values: &[NativeValue]) -> Result<SetType, Error> {
    let Some(first) = values.first() else {
        return Err(invalid_set_type("empty"));
    };
    match first {
        NativeValue::Binary(_) => Ok(SetType::Binary),
        NativeValue::String(_) => Ok(SetType::String),
        NativeValue::Number(_) => Ok(SetType::Number),
        other => Err(invalid_set_type(other.kind_name())),
    }
}

fn invalid_set_type(found: &str) -> Error {
    Error::new(ErrorKind::InvalidSetType)
        .with_message("sets can contain string, number, or binary values")
        .with_raw(found)
}
