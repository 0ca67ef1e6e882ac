use std::collections::BTreeMap;

use crate::document::payload::build_payload;
use crate::document::{DocumentMapping, LOGGER};
use crate::error::{not_found, OrmResult};
use crate::value::{FieldMap, FieldValue};

/// In-memory instance of a mapped document.
///
/// Every declared field owns a slot initialised to its default. The key is
/// absent until the record is created remotely or fetched.
#[derive(Clone, Debug)]
pub struct Record {
    mapping: DocumentMapping,
    key: Option<String>,
    slots: BTreeMap<String, Option<FieldValue>>,
}

impl Record {
    pub(crate) fn new(mapping: DocumentMapping) -> Self {
        let slots = mapping
            .schema()
            .fields()
            .map(|(name, field)| (name.to_owned(), field.default_value().cloned()))
            .collect();
        Self {
            mapping,
            key: None,
            slots,
        }
    }

    pub fn mapping(&self) -> &DocumentMapping {
        &self.mapping
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = Some(key.into());
    }

    /// Current value of a declared field; `None` when unset or undeclared.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.slots.get(name).and_then(Option::as_ref)
    }

    /// Assigns a declared field. Undeclared names are ignored and `false` is returned.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> bool {
        match self.slots.get_mut(name) {
            Some(slot) => {
                *slot = Some(value.into());
                true
            }
            None => {
                LOGGER.debug(format!(
                    "Ignoring undeclared field '{name}' on '{}'",
                    self.mapping.collection()
                ));
                false
            }
        }
    }

    pub fn unset(&mut self, name: &str) -> bool {
        match self.slots.get_mut(name) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Values of every slot that currently holds one.
    pub fn values(&self) -> FieldMap {
        self.slots
            .iter()
            .filter_map(|(name, value)| value.clone().map(|value| (name.clone(), value)))
            .collect()
    }

    /// The payload the next [`Record::put`] would send.
    pub fn pending_changes(&self) -> FieldMap {
        build_payload(
            self.mapping.schema(),
            &self.slots,
            self.mapping.payload_mode(),
        )
    }

    /// Loads the remote document at `key` (or the record's own key) into the record.
    ///
    /// Only declared fields present in the remote document are overwritten.
    pub async fn fetch(&mut self, key: Option<&str>) -> OrmResult<&mut Self> {
        let collection = self.mapping.collection().to_owned();
        let Some(key) = key.map(str::to_owned).or_else(|| self.key.clone()) else {
            return Err(not_found(format!(
                "Cannot fetch a '{collection}' record without a key"
            )));
        };

        let snapshot = self
            .mapping
            .session()
            .document_store()
            .get_document(&collection, &key)
            .await?;
        let Some(data) = snapshot.data() else {
            return Err(not_found(format!(
                "No document '{key}' in collection '{collection}'"
            )));
        };
        self.merge_remote(data);
        self.key = Some(key);
        Ok(self)
    }

    /// Persists the fields that differ from their defaults.
    ///
    /// A keyed record is merged into the existing document and reconciled with
    /// the stored result; otherwise a document is created and its key kept.
    pub async fn put(&mut self) -> OrmResult<&mut Self> {
        let collection = self.mapping.collection().to_owned();
        let payload = self.pending_changes();
        let store = self.mapping.session().document_store();

        match self.key.clone() {
            Some(key) => {
                LOGGER.debug(format!(
                    "Merging {} field(s) into '{collection}/{key}'",
                    payload.len()
                ));
                let snapshot = store.set_document(&collection, &key, payload, true).await?;
                if let Some(data) = snapshot.data() {
                    self.merge_remote(data);
                }
            }
            None => {
                let snapshot = store.add_document(&collection, payload).await?;
                LOGGER.debug(format!("Created '{collection}/{}'", snapshot.key()));
                self.key = Some(snapshot.key().to_owned());
            }
        }
        Ok(self)
    }

    pub(crate) fn merge_remote(&mut self, data: &FieldMap) {
        for (name, slot) in self.slots.iter_mut() {
            if let Some(value) = data.get(name) {
                *slot = Some(value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::ConnectionConfig;
    use crate::remote::InMemoryDocumentStore;
    use crate::schema::{DocumentSchema, FieldSchema};
    use crate::session::Session;

    fn mapping(app_id: &str, store: &InMemoryDocumentStore) -> DocumentMapping {
        let session = Session::builder(ConnectionConfig::new(app_id, "key"))
            .with_document_store(Arc::new(store.clone()))
            .build()
            .unwrap();
        let schema = DocumentSchema::builder("people")
            .field("name", FieldSchema::string())
            .field("age", FieldSchema::number().with_default(0))
            .field("city", FieldSchema::string().with_default("Paris"))
            .build()
            .unwrap();
        session.mapping(schema)
    }

    #[test]
    fn new_records_start_at_defaults() {
        let store = InMemoryDocumentStore::new();
        let mapping = mapping("record-defaults", &store);
        let mut record = mapping.new_record();

        assert_eq!(record.key(), None);
        assert_eq!(record.get("city").and_then(FieldValue::as_str), Some("Paris"));
        assert!(record.get("name").is_none());
        assert!(record.pending_changes().is_empty());
        assert!(!record.set("nickname", "x"));
        assert!(record.pending_changes().is_empty());
        mapping.session().disconnect();
    }

    #[tokio::test]
    async fn fetch_keeps_fields_missing_remotely() {
        let store = InMemoryDocumentStore::new();
        let mapping = mapping("record-fetch", &store);
        let mut remote = FieldMap::new();
        remote.insert("age".into(), FieldValue::from_integer(36));
        remote.insert("extra".into(), FieldValue::from_bool(true));
        store.insert("people", "ada", remote);

        let mut record = mapping.new_record();
        record.set("name", "Local");
        record.fetch(Some("ada")).await.unwrap();

        assert_eq!(record.key(), Some("ada"));
        assert_eq!(record.get("age").and_then(FieldValue::as_i64), Some(36));
        assert_eq!(record.get("name").and_then(FieldValue::as_str), Some("Local"));
        assert!(record.get("extra").is_none());
        mapping.session().disconnect();
    }

    #[tokio::test]
    async fn fetch_without_any_key_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let mapping = mapping("record-no-key", &store);
        let err = mapping.new_record().fetch(None).await.unwrap_err();
        assert!(err.is_not_found());
        mapping.session().disconnect();
    }

    #[tokio::test]
    async fn put_creates_then_merges() {
        let store = InMemoryDocumentStore::new();
        let mapping = mapping("record-put", &store);

        let mut record = mapping.new_record();
        record.set("name", "Grace");
        record.put().await.unwrap();
        let key = record.key().unwrap().to_owned();
        let stored = store.document("people", &key).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["name"].as_str(), Some("Grace"));

        record.set("age", 85);
        record.put().await.unwrap();
        let stored = store.document("people", &key).unwrap();
        assert_eq!(stored["age"].as_i64(), Some(85));
        assert_eq!(stored["name"].as_str(), Some("Grace"));
        assert_eq!(store.len("people"), 1);
        mapping.session().disconnect();
    }
}
