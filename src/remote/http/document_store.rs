use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value as JsonValue};

use crate::app::ConnectionConfig;
use crate::error::{transport_error, OrmResult};
use crate::query::QueryDefinition;
use crate::remote::{DocumentSnapshot, DocumentStore, TokenProviderArc, LOGGER};
use crate::value::FieldMap;

use super::connection::{AuthScheme, Connection};
use super::serializer::{encode_field_path, JsonProtoSerializer};

const FIRESTORE_API_VERSION: &str = "v1";

/// Document store backed by the Firestore v1 REST API.
#[derive(Clone, Debug)]
pub struct HttpDocumentStore {
    connection: Connection,
    serializer: JsonProtoSerializer,
    api_key: String,
}

impl HttpDocumentStore {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: &ConnectionConfig, client: Client) -> Self {
        let serializer = JsonProtoSerializer::new(config.project_id());
        let base_url = format!(
            "{}/{FIRESTORE_API_VERSION}/{}",
            config.firestore_base_url(),
            serializer.database_name()
        );
        Self {
            connection: Connection::new(client, base_url),
            serializer,
            api_key: config.api_key.clone(),
        }
    }

    /// Sends the provider's ID token as a bearer credential.
    pub fn with_token_provider(mut self, provider: TokenProviderArc) -> Self {
        self.connection = self.connection.with_token_provider(provider, AuthScheme::Bearer);
        self
    }

    fn document_path(collection: &str, key: &str) -> String {
        format!("documents/{collection}/{key}")
    }

    fn key_param(&self) -> (&'static str, String) {
        ("key", self.api_key.clone())
    }

    fn snapshot_from_document(&self, collection: &str, document: &JsonValue) -> OrmResult<DocumentSnapshot> {
        let (key, fields) = self.serializer.decode_document(document)?;
        Ok(DocumentSnapshot::new(collection, key, Some(fields)))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(&self, collection: &str, key: &str) -> OrmResult<DocumentSnapshot> {
        let response = self
            .connection
            .invoke_json_optional(
                Method::GET,
                &Self::document_path(collection, key),
                &[self.key_param()],
                None,
            )
            .await?;
        match response {
            Some(document) => self.snapshot_from_document(collection, &document),
            None => Ok(DocumentSnapshot::missing(collection, key)),
        }
    }

    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        data: FieldMap,
        merge: bool,
    ) -> OrmResult<DocumentSnapshot> {
        let path = Self::document_path(collection, key);
        let mut params = vec![self.key_param()];
        if merge {
            if data.is_empty() {
                // An empty mask would replace the whole document.
                let existing = self.get_document(collection, key).await?;
                if existing.exists() {
                    return Ok(existing);
                }
            }
            params.extend(
                data.keys()
                    .map(|field| ("updateMask.fieldPaths", encode_field_path(field))),
            );
        }
        let body = self.serializer.encode_document(&data);
        let document = self
            .connection
            .invoke_json(Method::PATCH, &path, &params, Some(body))
            .await?;
        self.snapshot_from_document(collection, &document)
    }

    async fn add_document(&self, collection: &str, data: FieldMap) -> OrmResult<DocumentSnapshot> {
        let body = self.serializer.encode_document(&data);
        let document = self
            .connection
            .invoke_json(
                Method::POST,
                &format!("documents/{collection}"),
                &[self.key_param()],
                Some(body),
            )
            .await?;
        self.snapshot_from_document(collection, &document)
    }

    async fn run_query(&self, query: &QueryDefinition) -> OrmResult<Vec<DocumentSnapshot>> {
        let body = json!({ "structuredQuery": self.serializer.encode_structured_query(query) });
        let response = self
            .connection
            .invoke_json(Method::POST, "documents:runQuery", &[self.key_param()], Some(body))
            .await?;
        let entries = response
            .as_array()
            .ok_or_else(|| transport_error("Firestore runQuery response must be an array"))?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let Some(document) = entry.get("document") else {
                continue;
            };
            snapshots.push(self.snapshot_from_document(query.collection(), document)?);
        }
        LOGGER.debug(format!(
            "runQuery on '{}' returned {} documents",
            query.collection(),
            snapshots.len()
        ));
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterOperator, QueryCondition};
    use crate::remote::TokenProvider;
    use crate::value::FieldValue;
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct SwitchableToken(Mutex<Option<String>>);

    #[async_trait]
    impl TokenProvider for SwitchableToken {
        async fn get_token(&self) -> OrmResult<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    const DOCS: &str = "/v1/projects/demo/databases/(default)/documents";

    fn store_for(server: &MockServer) -> HttpDocumentStore {
        let config = ConnectionConfig::new("demo", "test-key").with_firestore_host(server.base_url());
        HttpDocumentStore::new(&config)
    }

    #[tokio::test]
    async fn get_missing_document_is_not_an_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{DOCS}/people/nobody"));
                then.status(404).json_body(json!({
                    "error": { "code": 404, "message": "not found", "status": "NOT_FOUND" }
                }));
            })
            .await;

        let snapshot = store_for(&server).get_document("people", "nobody").await.unwrap();
        assert!(!snapshot.exists());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn merge_sends_update_mask_for_changed_fields() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("PATCH")
                    .path(format!("{DOCS}/people/ada"))
                    .query_param("updateMask.fieldPaths", "age")
                    .query_param("key", "test-key")
                    .json_body(json!({ "fields": { "age": { "integerValue": "37" } } }));
                then.status(200).json_body(json!({
                    "name": "projects/demo/databases/(default)/documents/people/ada",
                    "fields": {
                        "age": { "integerValue": "37" },
                        "name": { "stringValue": "Ada" }
                    }
                }));
            })
            .await;

        let mut data = FieldMap::new();
        data.insert("age".to_string(), FieldValue::from(37));
        let echoed = store_for(&server)
            .set_document("people", "ada", data, true)
            .await
            .unwrap();
        assert_eq!(echoed.data().unwrap().get("name"), Some(&FieldValue::from("Ada")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn add_document_reads_assigned_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(format!("{DOCS}/people"));
                then.status(200).json_body(json!({
                    "name": "projects/demo/databases/(default)/documents/people/generated123",
                    "fields": { "name": { "stringValue": "Grace" } }
                }));
            })
            .await;

        let mut data = FieldMap::new();
        data.insert("name".to_string(), FieldValue::from("Grace"));
        let snapshot = store_for(&server).add_document("people", data).await.unwrap();
        assert_eq!(snapshot.key(), "generated123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn run_query_posts_structured_query_with_default_limit() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("{DOCS}:runQuery"))
                    .json_body(json!({
                        "structuredQuery": {
                            "from": [{ "collectionId": "people", "allDescendants": false }],
                            "where": {
                                "fieldFilter": {
                                    "field": { "fieldPath": "age" },
                                    "op": "GREATER_THAN",
                                    "value": { "integerValue": "30" }
                                }
                            },
                            "limit": 1000
                        }
                    }));
                then.status(200).json_body(json!([
                    { "readTime": "2024-01-01T00:00:00Z" },
                    {
                        "document": {
                            "name": "projects/demo/databases/(default)/documents/people/alan",
                            "fields": { "age": { "integerValue": "41" } }
                        }
                    }
                ]));
            })
            .await;

        let query = QueryDefinition::build(
            "people",
            &[QueryCondition::filter("age", FilterOperator::GreaterThan, 30)],
        )
        .unwrap();
        let results = store_for(&server).run_query(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key(), "alan");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn service_errors_are_transport_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{DOCS}/people/ada"));
                then.status(403).json_body(json!({
                    "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
                }));
            })
            .await;

        let err = store_for(&server).get_document("people", "ada").await.unwrap_err();
        assert_eq!(err.code_str(), "orm/transport");
        assert_eq!(err.message(), "Missing or insufficient permissions.");
    }

    #[tokio::test]
    async fn token_is_read_per_request() {
        let server = MockServer::start_async().await;
        let authed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("{DOCS}/people/ada"))
                    .header("Authorization", "Bearer ID-TOKEN-123");
                then.status(200).json_body(json!({
                    "name": "projects/demo/databases/(default)/documents/people/ada",
                    "fields": { "name": { "stringValue": "Ada" } }
                }));
            })
            .await;
        let anonymous = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{DOCS}/people/ada"));
                then.status(403).json_body(json!({
                    "error": { "code": 403, "message": "denied", "status": "PERMISSION_DENIED" }
                }));
            })
            .await;

        let token = Arc::new(SwitchableToken::default());
        let store = store_for(&server).with_token_provider(token.clone());
        assert!(store.get_document("people", "ada").await.is_err());

        *token.0.lock().unwrap() = Some("ID-TOKEN-123".to_string());
        assert!(store.get_document("people", "ada").await.unwrap().exists());
        authed.assert_hits_async(1).await;
        anonymous.assert_hits_async(1).await;
    }
}
