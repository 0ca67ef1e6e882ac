use std::collections::BTreeMap;

use crate::schema::DocumentSchema;
use crate::value::{FieldMap, FieldValue};

/// How changed slots are turned into the outgoing write payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadMode {
    /// Fields that differ from their default are sent as they are; an unset slot
    /// whose default was a value is sent as null.
    #[default]
    Sparse,
    /// Fields that differ from their default are sent, but falsy or unset values
    /// become `0` for number fields and null for every other type.
    LegacyFalsyCoercion,
}

/// Builds the sparse write payload for `slots`: only fields whose value differs
/// from the declared default are included.
pub(crate) fn build_payload(
    schema: &DocumentSchema,
    slots: &BTreeMap<String, Option<FieldValue>>,
    mode: PayloadMode,
) -> FieldMap {
    let mut payload = FieldMap::new();
    for (name, field) in schema.fields() {
        let current = slots.get(name).and_then(Option::as_ref);
        if current == field.default_value() {
            continue;
        }
        let value = match mode {
            PayloadMode::Sparse => current.cloned().unwrap_or_else(FieldValue::null),
            PayloadMode::LegacyFalsyCoercion => match current {
                Some(value) if !value.is_falsy() => value.clone(),
                _ if field.is_number() => FieldValue::from_integer(0),
                _ => FieldValue::null(),
            },
        };
        payload.insert(name.to_owned(), value);
    }
    payload
}
