use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;

use crate::error::{configuration_error, OrmError, OrmResult};
use crate::value::FieldValue;

/// Closed set of slot types a document field may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Json,
    List,
    Datetime,
    Reference,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Json,
        FieldType::List,
        FieldType::Datetime,
        FieldType::Reference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Json => "json",
            FieldType::List => "list",
            FieldType::Datetime => "datetime",
            FieldType::Reference => "reference",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = OrmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| configuration_error(format!("Unknown field type '{value}'")))
    }
}

/// Target of a `reference` field: the collection holding the linked documents
/// plus free-form properties carried along with the declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceTarget {
    collection: String,
    properties: BTreeMap<String, JsonValue>,
}

impl ReferenceTarget {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn properties(&self) -> &BTreeMap<String, JsonValue> {
        &self.properties
    }
}

/// Declaration of one typed, optionally defaulted slot of a document.
///
/// The default is stored verbatim: no coercion happens when a schema is declared.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    field_type: FieldType,
    default: Option<FieldValue>,
    element: Option<Box<FieldSchema>>,
    reference: Option<ReferenceTarget>,
}

impl FieldSchema {
    fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            default: None,
            element: None,
            reference: None,
        }
    }

    /// Builds a scalar field from a type name such as `"number"`.
    ///
    /// `list` fields get untyped (`json`) elements and `reference` fields cannot be
    /// built this way since they need a target; use [`FieldSchema::list`] and
    /// [`FieldSchema::reference`] for those.
    pub fn from_type_name(name: &str) -> OrmResult<Self> {
        match name.parse::<FieldType>()? {
            FieldType::List => Ok(Self::list(Self::json())),
            FieldType::Reference => Err(configuration_error(
                "Reference fields must declare a target collection",
            )),
            other => Ok(Self::new(other)),
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn json() -> Self {
        Self::new(FieldType::Json)
    }

    pub fn datetime() -> Self {
        Self::new(FieldType::Datetime)
    }

    /// A list whose elements follow `element` (including its default).
    pub fn list(element: FieldSchema) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::new(FieldType::List)
        }
    }

    pub fn reference(target: ReferenceTarget) -> Self {
        Self {
            reference: Some(target),
            ..Self::new(FieldType::Reference)
        }
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn default_value(&self) -> Option<&FieldValue> {
        self.default.as_ref()
    }

    /// Element schema of a `list` field.
    pub fn element(&self) -> Option<&FieldSchema> {
        self.element.as_deref()
    }

    /// Default applied to new list elements.
    pub fn element_default(&self) -> Option<&FieldValue> {
        self.element().and_then(FieldSchema::default_value)
    }

    pub fn reference_target(&self) -> Option<&ReferenceTarget> {
        self.reference.as_ref()
    }

    pub fn is_number(&self) -> bool {
        self.field_type == FieldType::Number
    }
}
