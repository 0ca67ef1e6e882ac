mod json;
mod value;

pub use json::{map_from_json, map_to_json};
pub use value::{FieldMap, FieldValue, ValueKind};
