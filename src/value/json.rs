use chrono::SecondsFormat;
use serde_json::{Map, Number, Value as JsonValue};

use crate::value::{FieldMap, FieldValue, ValueKind};

impl FieldValue {
    /// Converts plain JSON into a field value.
    ///
    /// Whole numbers that fit in an `i64` become integers, every other number a
    /// double. Strings are kept as strings; timestamps are never inferred.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::null(),
            JsonValue::Bool(flag) => FieldValue::from_bool(*flag),
            JsonValue::Number(number) => match number.as_i64() {
                Some(integer) => FieldValue::from_integer(integer),
                None => FieldValue::from_double(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(text) => FieldValue::from_string(text.clone()),
            JsonValue::Array(values) => {
                FieldValue::from_array(values.iter().map(FieldValue::from_json).collect())
            }
            JsonValue::Object(fields) => FieldValue::from_map(map_from_json(fields)),
        }
    }

    /// Converts the value into plain JSON. Timestamps become RFC 3339 strings and
    /// non-finite doubles become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self.kind() {
            ValueKind::Null => JsonValue::Null,
            ValueKind::Boolean(flag) => JsonValue::Bool(*flag),
            ValueKind::Integer(integer) => JsonValue::Number(Number::from(*integer)),
            ValueKind::Double(double) => Number::from_f64(*double)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ValueKind::Timestamp(timestamp) => {
                JsonValue::String(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            ValueKind::String(text) | ValueKind::Reference(text) => JsonValue::String(text.clone()),
            ValueKind::Array(values) => {
                JsonValue::Array(values.iter().map(FieldValue::to_json).collect())
            }
            ValueKind::Map(fields) => JsonValue::Object(map_to_json(fields)),
        }
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        FieldValue::from_json(&value)
    }
}

pub fn map_from_json(fields: &Map<String, JsonValue>) -> FieldMap {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
        .collect()
}

pub fn map_to_json(fields: &FieldMap) -> Map<String, JsonValue> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}
