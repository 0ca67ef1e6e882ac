use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{configuration_error, OrmError, OrmResult};
use crate::schema::{DocumentSchema, FieldSchema, FieldType, ReferenceTarget};
use crate::value::FieldValue;

/// Serializable form of a [`DocumentSchema`].
///
/// ```json
/// { "name": "users",
///   "fields": [ { "name": "age", "type": "number", "default": 0 },
///               { "name": "tags", "type": "list", "element": { "type": "string" } },
///               { "name": "owner", "type": "reference", "target": "accounts" } ] }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<FieldDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonValue>,
}

impl FieldDescriptor {
    fn to_schema(&self) -> OrmResult<FieldSchema> {
        let field_type: FieldType = self.field_type.parse()?;
        let schema = match field_type {
            FieldType::List => {
                let element = match &self.element {
                    Some(element) => element.to_schema()?,
                    None => FieldSchema::json(),
                };
                FieldSchema::list(element)
            }
            FieldType::Reference => {
                let collection = self.target.as_deref().ok_or_else(|| {
                    configuration_error("Reference fields must declare a target collection")
                })?;
                let target = self
                    .properties
                    .iter()
                    .fold(ReferenceTarget::new(collection), |target, (key, value)| {
                        target.with_property(key.clone(), value.clone())
                    });
                FieldSchema::reference(target)
            }
            other => FieldSchema::from_type_name(other.as_str())?,
        };
        Ok(match &self.default {
            Some(default) => schema.with_default(FieldValue::from_json(default)),
            None => schema,
        })
    }

    fn from_schema(name: &str, schema: &FieldSchema) -> Self {
        Self {
            name: name.to_owned(),
            field_type: schema.field_type().as_str().to_owned(),
            default: schema.default_value().map(FieldValue::to_json),
            element: schema
                .element()
                .map(|element| Box::new(FieldDescriptor::from_schema("", element))),
            target: schema
                .reference_target()
                .map(|target| target.collection().to_owned()),
            properties: schema
                .reference_target()
                .map(|target| target.properties().clone())
                .unwrap_or_default(),
        }
    }
}

impl DocumentSchema {
    pub fn from_descriptor(descriptor: &SchemaDescriptor) -> OrmResult<Self> {
        descriptor
            .fields
            .iter()
            .try_fold(
                DocumentSchema::builder(descriptor.name.clone()),
                |builder, field| {
                    let schema = field
                        .to_schema()
                        .map_err(|err| invalid_field(&field.name, &err))?;
                    Ok::<_, OrmError>(builder.field(field.name.clone(), schema))
                },
            )?
            .build()
    }

    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            name: self.name().to_owned(),
            fields: self
                .fields()
                .map(|(name, schema)| FieldDescriptor::from_schema(name, schema))
                .collect(),
        }
    }

    /// Parses a schema from JSON.
    ///
    /// `fields` may be the ordered descriptor array or an object mapping field names
    /// to declarations. Both forms keep the declaration order of the source. Any entry that is not a valid declaration fails with a
    /// configuration error naming the field.
    pub fn from_json(value: &JsonValue) -> OrmResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| configuration_error("Schema must be a JSON object"))?;
        let name = object
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| configuration_error("Schema is missing its collection 'name'"))?;

        let fields = match object.get("fields") {
            None => Vec::new(),
            Some(JsonValue::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    let label = entry
                        .get("name")
                        .and_then(JsonValue::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| format!("#{index}"));
                    parse_field_entry(&label, entry, None)
                })
                .collect::<OrmResult<Vec<_>>>()?,
            Some(JsonValue::Object(entries)) => entries
                .iter()
                .map(|(field, entry)| parse_field_entry(field, entry, Some(field)))
                .collect::<OrmResult<Vec<_>>>()?,
            Some(_) => {
                return Err(configuration_error(
                    "Schema 'fields' must be an array or an object",
                ))
            }
        };

        DocumentSchema::from_descriptor(&SchemaDescriptor {
            name: name.to_owned(),
            fields,
        })
    }
}

fn parse_field_entry(
    label: &str,
    entry: &JsonValue,
    name: Option<&str>,
) -> OrmResult<FieldDescriptor> {
    if !entry.is_object() {
        return Err(configuration_error(format!(
            "Field '{label}' is not a valid field schema"
        )));
    }
    let mut descriptor: FieldDescriptor = serde_json::from_value(entry.clone()).map_err(|err| {
        configuration_error(format!("Field '{label}' is not a valid field schema: {err}"))
    })?;
    if let Some(name) = name {
        descriptor.name = name.to_owned();
    }
    Ok(descriptor)
}

fn invalid_field(name: &str, err: &OrmError) -> OrmError {
    configuration_error(format!(
        "Field '{name}' is not a valid field schema: {}",
        err.message()
    ))
}
