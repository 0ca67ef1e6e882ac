use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::app::ConnectionConfig;
use crate::document::converter::DocumentConverter;
use crate::document::payload::PayloadMode;
use crate::document::record::Record;
use crate::document::LOGGER;
use crate::error::OrmResult;
use crate::query::{validate_conditions, QueryCondition, QueryDefinition};
use crate::schema::DocumentSchema;
use crate::session::Session;

/// A document schema bound to the session that stores its records.
#[derive(Clone, Debug)]
pub struct DocumentMapping {
    schema: Arc<DocumentSchema>,
    session: Session,
    mode: PayloadMode,
}

impl DocumentMapping {
    /// Binds `schema` to the session for `config`, or to the process default when omitted.
    pub fn new(schema: DocumentSchema, config: Option<ConnectionConfig>) -> OrmResult<Self> {
        let session = Session::connect(config)?;
        Ok(Self::with_session(schema, session))
    }

    /// Parses the JSON field map form of a schema (see [`DocumentSchema::from_json`]).
    pub fn from_field_map(value: &JsonValue, config: Option<ConnectionConfig>) -> OrmResult<Self> {
        let schema = DocumentSchema::from_json(value)?;
        Self::new(schema, config)
    }

    pub(crate) fn with_session(schema: DocumentSchema, session: Session) -> Self {
        Self {
            schema: Arc::new(schema),
            session,
            mode: PayloadMode::default(),
        }
    }

    pub fn with_payload_mode(mut self, mode: PayloadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn payload_mode(&self) -> PayloadMode {
        self.mode
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    pub fn collection(&self) -> &str {
        self.schema.name()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn new_record(&self) -> Record {
        Record::new(self.clone())
    }

    /// Fetches the record stored under `key`.
    pub async fn fetch(&self, key: &str) -> OrmResult<Record> {
        let mut record = self.new_record();
        record.fetch(Some(key)).await?;
        Ok(record)
    }

    /// Runs a query over the collection.
    ///
    /// Conditions are validated before anything is sent. Without a limit
    /// directive at most [`crate::query::DEFAULT_QUERY_LIMIT`] records are returned.
    pub async fn query(&self, conditions: &[QueryCondition]) -> OrmResult<Vec<Record>> {
        validate_conditions(conditions)?;
        let definition = QueryDefinition::build(self.collection(), conditions)?;
        let snapshots = self
            .session
            .document_store()
            .run_query(&definition)
            .await?;
        LOGGER.debug(format!(
            "Query on '{}' returned {} document(s)",
            self.collection(),
            snapshots.len()
        ));

        Ok(snapshots
            .into_iter()
            .map(|snapshot| {
                let mut record = self.new_record();
                if let Some(data) = snapshot.data() {
                    record.merge_remote(data);
                }
                record.set_key(snapshot.key());
                record
            })
            .collect())
    }

    /// Like [`DocumentMapping::query`] with conditions in their JSON form.
    pub async fn query_json(&self, conditions: &JsonValue) -> OrmResult<Vec<Record>> {
        let conditions = QueryCondition::list_from_json(conditions)?;
        self.query(&conditions).await
    }

    pub async fn fetch_as<C: DocumentConverter>(&self, converter: &C, key: &str) -> OrmResult<C::Model> {
        let record = self.fetch(key).await?;
        converter.from_fields(&record.values())
    }

    pub async fn query_as<C: DocumentConverter>(
        &self,
        converter: &C,
        conditions: &[QueryCondition],
    ) -> OrmResult<Vec<C::Model>> {
        self.query(conditions)
            .await?
            .iter()
            .map(|record| converter.from_fields(&record.values()))
            .collect()
    }

    /// Stores `model` under `key`, or under a new key when `None`, and returns the record.
    pub async fn put_model<C: DocumentConverter>(
        &self,
        converter: &C,
        key: Option<&str>,
        model: &C::Model,
    ) -> OrmResult<Record> {
        let mut record = self.new_record();
        if let Some(key) = key {
            record.set_key(key);
        }
        for (name, value) in converter.to_fields(model)? {
            record.set(&name, value);
        }
        record.put().await?;
        Ok(record)
    }
}
