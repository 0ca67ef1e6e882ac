use crate::error::{configuration_error, OrmResult};
use crate::schema::FieldSchema;

/// Ordered set of field declarations for one remote collection.
///
/// `name` identifies the collection and is always supplied explicitly so that it
/// survives renaming of the Rust types that use it.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSchema {
    name: String,
    fields: Vec<(String, FieldSchema)>,
}

impl DocumentSchema {
    pub fn builder(name: impl Into<String>) -> DocumentSchemaBuilder {
        DocumentSchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, schema)| schema)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct DocumentSchemaBuilder {
    name: String,
    fields: Vec<(String, FieldSchema)>,
}

impl DocumentSchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    pub fn build(self) -> OrmResult<DocumentSchema> {
        if self.name.trim().is_empty() {
            return Err(configuration_error(
                "Document schemas need an explicit, non-empty collection name",
            ));
        }
        if self.name.contains('/') {
            return Err(configuration_error(format!(
                "Collection name '{}' must not contain '/'",
                self.name
            )));
        }
        for (index, (name, _)) in self.fields.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(configuration_error(format!(
                    "Field #{index} of '{}' has an empty name",
                    self.name
                )));
            }
            if self.fields[..index].iter().any(|(other, _)| other == name) {
                return Err(configuration_error(format!(
                    "Field '{name}' is declared twice in '{}'",
                    self.name
                )));
            }
        }
        Ok(DocumentSchema {
            name: self.name,
            fields: self.fields,
        })
    }
}
