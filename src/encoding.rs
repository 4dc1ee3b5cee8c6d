//! Canonical textual encodings for structural tuples and the JSON column converters
//! used at the storage boundary. Each `decode` is the exact inverse of its `encode`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EncodingError;

/// Tuple with one fixed, order-preserving textual form.
pub(crate) trait Canonical: Sized {
    fn encode(&self) -> String;
    fn decode(raw: &str) -> Result<Self, EncodingError>;
}

/// Field declared by a class, encoded as `["name","modifiers","type"]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct FieldInfo {
    pub(crate) name: String,
    pub(crate) modifiers: u32,
    pub(crate) type_name: String,
}

impl Canonical for FieldInfo {
    fn encode(&self) -> String {
        Value::Array(vec![
            Value::from(self.name.as_str()),
            Value::from(self.modifiers.to_string()),
            Value::from(self.type_name.as_str()),
        ])
        .to_string()
    }

    fn decode(raw: &str) -> Result<Self, EncodingError> {
        let (name, modifiers, type_name): (String, String, String) = serde_json::from_str(raw)?;
        let modifiers = modifiers
            .parse()
            .map_err(|_| EncodingError::malformed(raw, "modifiers are not an integer"))?;
        Ok(FieldInfo {
            name,
            modifiers,
            type_name,
        })
    }
}

/// Position-tagged type: class/method annotations and method parameters, encoded as
/// `[position,"type"]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PositionedType {
    pub(crate) position: usize,
    pub(crate) type_name: String,
}

impl Canonical for PositionedType {
    fn encode(&self) -> String {
        Value::Array(vec![
            Value::from(self.position),
            Value::from(self.type_name.as_str()),
        ])
        .to_string()
    }

    fn decode(raw: &str) -> Result<Self, EncodingError> {
        let (position, type_name): (usize, String) = serde_json::from_str(raw)?;
        Ok(PositionedType {
            position,
            type_name,
        })
    }
}

/// All annotations on one method parameter, encoded as `[position,"type",...]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ParameterAnnotations {
    pub(crate) position: usize,
    pub(crate) types: Vec<String>,
}

impl Canonical for ParameterAnnotations {
    fn encode(&self) -> String {
        let mut items = Vec::with_capacity(self.types.len() + 1);
        items.push(Value::from(self.position));
        items.extend(self.types.iter().map(|t| Value::from(t.as_str())));
        Value::Array(items).to_string()
    }

    fn decode(raw: &str) -> Result<Self, EncodingError> {
        let items: Vec<Value> = serde_json::from_str(raw)?;
        let mut items = items.into_iter();
        let position = items
            .next()
            .and_then(|value| value.as_u64())
            .ok_or_else(|| EncodingError::malformed(raw, "missing parameter position"))?;
        let mut types = Vec::new();
        for item in items {
            match item {
                Value::String(type_name) => types.push(type_name),
                _ => return Err(EncodingError::malformed(raw, "annotation type is not text")),
            }
        }
        Ok(ParameterAnnotations {
            position: position as usize,
            types,
        })
    }
}

/// Serialize a collection column (set, list, map) to its JSON text.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, EncodingError> {
    Ok(serde_json::to_string(value)?)
}

/// Inverse of [`to_json`].
pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, EncodingError> {
    Ok(serde_json::from_str(raw)?)
}
