use crate::error::OrmResult;
use crate::value::FieldMap;

/// Converts between an application model and the fields of a record.
pub trait DocumentConverter: Send + Sync {
    type Model;

    /// Fields to assign on the record; names the schema does not declare are ignored.
    fn to_fields(&self, model: &Self::Model) -> OrmResult<FieldMap>;

    /// Builds the model from the values a record currently holds.
    fn from_fields(&self, fields: &FieldMap) -> OrmResult<Self::Model>;
}

/// Converter that exposes the raw field map.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldMapConverter;

impl DocumentConverter for FieldMapConverter {
    type Model = FieldMap;

    fn to_fields(&self, model: &FieldMap) -> OrmResult<FieldMap> {
        Ok(model.clone())
    }

    fn from_fields(&self, fields: &FieldMap) -> OrmResult<FieldMap> {
        Ok(fields.clone())
    }
}
