use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Generic key-value representation of a document's fields.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A dynamically typed value stored in a record slot or exchanged with the remote store.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValue {
    kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    /// Full resource name of another document.
    Reference(String),
    Array(Vec<FieldValue>),
    Map(FieldMap),
}

impl FieldValue {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: DateTime<Utc>) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_reference(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Reference(value.into()),
        }
    }

    pub fn from_array(values: Vec<FieldValue>) -> Self {
        Self {
            kind: ValueKind::Array(values),
        }
    }

    pub fn from_map(fields: FieldMap) -> Self {
        Self {
            kind: ValueKind::Map(fields),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    /// JavaScript-style falsiness: null, `false`, zero, NaN and the empty string.
    pub fn is_falsy(&self) -> bool {
        match &self.kind {
            ValueKind::Null => true,
            ValueKind::Boolean(flag) => !flag,
            ValueKind::Integer(value) => *value == 0,
            ValueKind::Double(value) => *value == 0.0 || value.is_nan(),
            ValueKind::String(value) => value.is_empty(),
            ValueKind::Timestamp(_)
            | ValueKind::Reference(_)
            | ValueKind::Array(_)
            | ValueKind::Map(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(value) | ValueKind::Reference(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric view of integer and double values.
    pub fn as_f64(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value as f64),
            ValueKind::Double(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match &self.kind {
            ValueKind::Timestamp(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match &self.kind {
            ValueKind::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match &self.kind {
            ValueKind::Map(fields) => Some(fields),
            _ => None,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::null()
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::from_integer(value as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::from_integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::from_double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::from_string(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_timestamp(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(values: Vec<FieldValue>) -> Self {
        Self::from_array(values)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(fields: FieldMap) -> Self {
        Self::from_map(fields)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(FieldValue::null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsiness_matches_javascript_rules() {
        assert!(FieldValue::null().is_falsy());
        assert!(FieldValue::from(false).is_falsy());
        assert!(FieldValue::from(0).is_falsy());
        assert!(FieldValue::from(f64::NAN).is_falsy());
        assert!(FieldValue::from("").is_falsy());

        assert!(!FieldValue::from(true).is_falsy());
        assert!(!FieldValue::from(-1).is_falsy());
        assert!(!FieldValue::from("0").is_falsy());
        assert!(!FieldValue::from_array(Vec::new()).is_falsy());
        assert!(!FieldValue::from_map(FieldMap::new()).is_falsy());
    }

    #[test]
    fn numeric_view_covers_integers_and_doubles() {
        assert_eq!(FieldValue::from(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::from(2.5).as_f64(), Some(2.5));
        assert_eq!(FieldValue::from("3").as_f64(), None);
    }
}
