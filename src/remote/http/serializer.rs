use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};

use crate::error::{transport_error, OrmResult};
use crate::query::{FieldFilter, OrderBy, QueryDefinition};
use crate::value::{FieldMap, FieldValue, ValueKind};

const DEFAULT_DATABASE: &str = "(default)";

/// Encodes field values and queries in the Firestore v1 JSON representation.
#[derive(Clone, Debug)]
pub struct JsonProtoSerializer {
    project_id: String,
    database: String,
}

impl JsonProtoSerializer {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }

    pub fn database_name(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }

    pub fn document_name(&self, collection: &str, key: &str) -> String {
        format!("{}/documents/{collection}/{key}", self.database_name())
    }

    pub fn encode_document(&self, data: &FieldMap) -> JsonValue {
        json!({ "fields": encode_map_fields(data) })
    }

    /// Decodes a `Document` resource into its key (last name segment) and fields.
    pub fn decode_document(&self, document: &JsonValue) -> OrmResult<(String, FieldMap)> {
        let name = document
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| transport_error("Firestore document is missing its 'name'"))?;
        let prefix = format!("{}/documents/", self.database_name());
        let relative = name.strip_prefix(&prefix).ok_or_else(|| {
            transport_error(format!("Unexpected document name '{name}' returned by Firestore"))
        })?;
        let key = relative
            .rsplit('/')
            .next()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| transport_error(format!("Document name '{name}' has no key")))?;
        Ok((key.to_string(), decode_map_value(document)?))
    }

    pub fn encode_value(&self, value: &FieldValue) -> JsonValue {
        encode_value(value)
    }

    pub fn decode_value(&self, value: &JsonValue) -> OrmResult<FieldValue> {
        decode_value(value)
    }

    pub fn encode_structured_query(&self, query: &QueryDefinition) -> JsonValue {
        let mut structured = serde_json::Map::new();
        structured.insert(
            "from".to_string(),
            json!([{ "collectionId": query.collection(), "allDescendants": false }]),
        );
        if !query.filters().is_empty() {
            structured.insert("where".to_string(), self.encode_filters(query.filters()));
        }
        if !query.order_by().is_empty() {
            let orders: Vec<JsonValue> = query.order_by().iter().map(encode_order).collect();
            structured.insert("orderBy".to_string(), JsonValue::Array(orders));
        }
        structured.insert("limit".to_string(), json!(query.limit()));
        JsonValue::Object(structured)
    }

    fn encode_filters(&self, filters: &[FieldFilter]) -> JsonValue {
        if filters.len() == 1 {
            return self.encode_field_filter(&filters[0]);
        }
        let nested: Vec<JsonValue> = filters
            .iter()
            .map(|filter| self.encode_field_filter(filter))
            .collect();
        json!({
            "compositeFilter": {
                "op": "AND",
                "filters": nested
            }
        })
    }

    fn encode_field_filter(&self, filter: &FieldFilter) -> JsonValue {
        json!({
            "fieldFilter": {
                "field": { "fieldPath": encode_field_path(filter.field()) },
                "op": filter.operator().rest_name(),
                "value": encode_value(filter.value())
            }
        })
    }
}

fn encode_order(order: &OrderBy) -> JsonValue {
    json!({
        "field": { "fieldPath": encode_field_path(order.field()) },
        "direction": order.direction().rest_name(),
    })
}

/// Quotes path segments that are not simple identifiers.
pub fn encode_field_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            let simple = segment
                .chars()
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if simple {
                segment.to_string()
            } else {
                format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn encode_map_fields(map: &FieldMap) -> JsonValue {
    let fields: serde_json::Map<String, JsonValue> = map
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect();
    JsonValue::Object(fields)
}

fn encode_value(value: &FieldValue) -> JsonValue {
    match value.kind() {
        ValueKind::Null => json!({ "nullValue": JsonValue::Null }),
        ValueKind::Boolean(boolean) => json!({ "booleanValue": boolean }),
        ValueKind::Integer(integer) => json!({ "integerValue": integer.to_string() }),
        ValueKind::Double(double) => {
            if double.is_finite() {
                json!({ "doubleValue": double })
            } else {
                json!({ "doubleValue": double.to_string() })
            }
        }
        ValueKind::Timestamp(timestamp) => {
            json!({ "timestampValue": timestamp.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        ValueKind::String(string) => json!({ "stringValue": string }),
        ValueKind::Reference(reference) => json!({ "referenceValue": reference }),
        ValueKind::Array(values) => {
            let values: Vec<JsonValue> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        ValueKind::Map(map) => json!({ "mapValue": { "fields": encode_map_fields(map) } }),
    }
}

fn decode_map_value(value: &JsonValue) -> OrmResult<FieldMap> {
    let fields_object = match value.get("fields") {
        Some(fields) => fields
            .as_object()
            .ok_or_else(|| transport_error("Expected 'fields' to be an object"))?,
        None => return Ok(BTreeMap::new()),
    };
    fields_object
        .iter()
        .map(|(key, value)| decode_value(value).map(|decoded| (key.clone(), decoded)))
        .collect()
}

fn decode_value(value: &JsonValue) -> OrmResult<FieldValue> {
    let object = value
        .as_object()
        .ok_or_else(|| transport_error("Expected Firestore value object"))?;
    if object.contains_key("nullValue") {
        return Ok(FieldValue::null());
    }
    if let Some(bool_value) = object.get("booleanValue") {
        let value = bool_value
            .as_bool()
            .ok_or_else(|| transport_error("booleanValue must be bool"))?;
        return Ok(FieldValue::from_bool(value));
    }
    if let Some(integer_value) = object.get("integerValue") {
        let parsed = match integer_value {
            JsonValue::String(value) => i64::from_str(value)
                .map_err(|err| transport_error(format!("Invalid integerValue: {err}")))?,
            JsonValue::Number(number) => number
                .as_i64()
                .ok_or_else(|| transport_error("Integer out of range"))?,
            _ => return Err(transport_error("integerValue must be a string or number")),
        };
        return Ok(FieldValue::from_integer(parsed));
    }
    if let Some(double_value) = object.get("doubleValue") {
        let parsed = match double_value {
            JsonValue::Number(number) => number
                .as_f64()
                .ok_or_else(|| transport_error("Invalid doubleValue"))?,
            JsonValue::String(value) => value
                .parse::<f64>()
                .map_err(|err| transport_error(format!("Invalid doubleValue: {err}")))?,
            _ => return Err(transport_error("doubleValue must be a number or string")),
        };
        return Ok(FieldValue::from_double(parsed));
    }
    if let Some(timestamp_value) = object.get("timestampValue") {
        let raw = timestamp_value
            .as_str()
            .ok_or_else(|| transport_error("timestampValue must be string"))?;
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map_err(|err| transport_error(format!("Invalid timestamp: {err}")))?;
        return Ok(FieldValue::from_timestamp(parsed.with_timezone(&Utc)));
    }
    if let Some(string_value) = object.get("stringValue") {
        let value = string_value
            .as_str()
            .ok_or_else(|| transport_error("stringValue must be string"))?;
        return Ok(FieldValue::from_string(value));
    }
    if let Some(reference_value) = object.get("referenceValue") {
        let value = reference_value
            .as_str()
            .ok_or_else(|| transport_error("referenceValue must be string"))?;
        return Ok(FieldValue::from_reference(value));
    }
    if let Some(array_value) = object.get("arrayValue") {
        let decoded = match array_value.get("values").and_then(JsonValue::as_array) {
            Some(entries) => entries
                .iter()
                .map(decode_value)
                .collect::<OrmResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        return Ok(FieldValue::from_array(decoded));
    }
    if let Some(map_value) = object.get("mapValue") {
        return Ok(FieldValue::from_map(decode_map_value(map_value)?));
    }

    Err(transport_error("Unsupported Firestore value type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterOperator, OrderDirection, QueryCondition};

    #[test]
    fn decodes_document_key_and_fields() {
        let serializer = JsonProtoSerializer::new("demo");
        let document = json!({
            "name": "projects/demo/databases/(default)/documents/people/ada",
            "fields": {
                "name": { "stringValue": "Ada" },
                "age": { "integerValue": "36" },
                "tags": { "arrayValue": { "values": [{ "stringValue": "math" }] } },
                "born": { "timestampValue": "1815-12-10T00:00:00Z" }
            }
        });
        let (key, fields) = serializer.decode_document(&document).unwrap();
        assert_eq!(key, "ada");
        assert_eq!(fields.get("age"), Some(&FieldValue::from_integer(36)));
        assert_eq!(
            fields.get("tags"),
            Some(&FieldValue::from_array(vec![FieldValue::from("math")]))
        );
        assert!(fields.get("born").unwrap().as_timestamp().is_some());
    }

    #[test]
    fn rejects_foreign_document_names() {
        let serializer = JsonProtoSerializer::new("demo");
        let err = serializer
            .decode_document(&json!({ "name": "projects/other/databases/(default)/documents/a/b" }))
            .unwrap_err();
        assert_eq!(err.code_str(), "orm/transport");
    }

    #[test]
    fn structured_query_combines_filters() {
        let serializer = JsonProtoSerializer::new("demo");
        let query = QueryDefinition::build(
            "people",
            &[
                QueryCondition::filter("age", FilterOperator::GreaterThanOrEqual, 18),
                QueryCondition::filter("tags", FilterOperator::ArrayContains, "math"),
                QueryCondition::order_by("age", Some(OrderDirection::Descending)),
            ],
        )
        .unwrap();
        let encoded = serializer.encode_structured_query(&query);
        assert_eq!(encoded["from"][0]["collectionId"], "people");
        assert_eq!(encoded["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(
            encoded["where"]["compositeFilter"]["filters"][1]["fieldFilter"]["op"],
            "ARRAY_CONTAINS"
        );
        assert_eq!(encoded["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(encoded["limit"], 1000);
    }

    #[test]
    fn field_paths_are_quoted_when_needed() {
        assert_eq!(encode_field_path("age"), "age");
        assert_eq!(encode_field_path("first name"), "`first name`");
        assert_eq!(encode_field_path("address.zip-code"), "address.`zip-code`");
    }
}
