//! Field and document schema declarations.

mod descriptor;
mod document;
mod field;

pub use descriptor::{FieldDescriptor, SchemaDescriptor};
pub use document::{DocumentSchema, DocumentSchemaBuilder};
pub use field::{FieldSchema, FieldType, ReferenceTarget};
