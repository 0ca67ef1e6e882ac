use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use firebase_orm::app::ConnectionConfig;
use firebase_orm::error::{canceled, OrmErrorCode, OrmResult};
use firebase_orm::query::{FilterOperator, QueryCondition};
use firebase_orm::remote::{PopupHandler, PopupRequest, ProviderCredential};
use firebase_orm::schema::{DocumentSchema, FieldSchema};
use firebase_orm::session::{Session, SIGN_IN_CANCELED_MESSAGE};
use firebase_orm::value::FieldValue;
use httpmock::prelude::*;
use serde_json::json;

fn unique_project(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn session_for(server: &MockServer, project: &str) -> Session {
    Session::builder(
        ConnectionConfig::new(project, "rest-key")
            .with_google_enabled(true)
            .with_firestore_host(server.base_url())
            .with_auth_host(server.base_url())
            .with_storage_host(server.base_url()),
    )
    .with_popup_handler(Arc::new(DismissedPopup))
    .build()
    .unwrap()
}

fn people() -> DocumentSchema {
    DocumentSchema::builder("people")
        .field("name", FieldSchema::string())
        .field("age", FieldSchema::number().with_default(0))
        .field("city", FieldSchema::string().with_default("Paris"))
        .build()
        .unwrap()
}

struct DismissedPopup;

impl PopupHandler for DismissedPopup {
    fn open_popup(&self, request: PopupRequest) -> OrmResult<ProviderCredential> {
        assert_eq!(request.provider_id, "google.com");
        Err(canceled("window closed"))
    }
}

#[tokio::test]
async fn keyed_put_sends_update_mask_for_changed_fields_only() {
    let server = MockServer::start_async().await;
    let project = unique_project("rest-put");
    let documents = format!("/v1/projects/{project}/databases/(default)/documents");
    let mock = server
        .mock_async(|when, then| {
            when.method("PATCH")
                .path(format!("{documents}/people/ada"))
                .query_param("updateMask.fieldPaths", "name")
                .query_param("updateMask.fieldPaths", "age")
                .json_body(json!({
                    "fields": {
                        "age": { "integerValue": "36" },
                        "name": { "stringValue": "Ada" }
                    }
                }));
            then.status(200).json_body(json!({
                "name": format!("projects/{project}/databases/(default)/documents/people/ada"),
                "fields": {
                    "age": { "integerValue": "36" },
                    "name": { "stringValue": "Ada" },
                    "city": { "stringValue": "London" }
                }
            }));
        })
        .await;

    let session = session_for(&server, &project);
    let mut record = session.mapping(people()).new_record();
    record.set_key("ada");
    record.set("name", "Ada");
    record.set("age", 36);
    record.put().await.unwrap();

    assert_eq!(record.get("city").and_then(FieldValue::as_str), Some("London"));
    mock.assert_async().await;
    session.disconnect();
}

#[tokio::test]
async fn mapping_query_sends_structured_query_with_default_limit() {
    let server = MockServer::start_async().await;
    let project = unique_project("rest-query");
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!(
                    "/v1/projects/{project}/databases/(default)/documents:runQuery"
                ))
                .json_body(json!({
                    "structuredQuery": {
                        "from": [{ "collectionId": "people", "allDescendants": false }],
                        "where": {
                            "fieldFilter": {
                                "field": { "fieldPath": "city" },
                                "op": "EQUAL",
                                "value": { "stringValue": "Paris" }
                            }
                        },
                        "limit": 1000
                    }
                }));
            then.status(200).json_body(json!([
                {
                    "document": {
                        "name": format!("projects/{project}/databases/(default)/documents/people/marie"),
                        "fields": { "name": { "stringValue": "Marie" } }
                    }
                }
            ]));
        })
        .await;

    let session = session_for(&server, &project);
    let records = session
        .mapping(people())
        .query(&[QueryCondition::filter("city", FilterOperator::Equal, "Paris")])
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key(), Some("marie"));
    assert_eq!(records[0].get("age").and_then(FieldValue::as_i64), Some(0));
    mock.assert_async().await;
    session.disconnect();
}

#[tokio::test]
async fn fetch_of_missing_document_is_not_found() {
    let server = MockServer::start_async().await;
    let project = unique_project("rest-missing");
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/documents/people/ghost");
            then.status(404).json_body(json!({
                "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
            }));
        })
        .await;

    let session = session_for(&server, &project);
    let err = session.mapping(people()).fetch("ghost").await.unwrap_err();
    assert_eq!(err.code, OrmErrorCode::NotFound);
    session.disconnect();
}

#[tokio::test]
async fn email_sign_in_notifies_subscribers() {
    let server = MockServer::start_async().await;
    let project = unique_project("rest-auth");
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path_contains("accounts:signInWithPassword")
                .query_param("key", "rest-key");
            then.status(200).json_body(json!({
                "localId": "uid-ada",
                "email": "ada@example.com",
                "idToken": "id-token",
                "refreshToken": "refresh-token"
            }));
        })
        .await;

    let session = session_for(&server, &project);
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.subscribe_auth_state(move |identity| {
        sink.lock().unwrap().push(identity.map(|identity| identity.uid.clone()));
    });

    let identity = session.email_sign_in("ada@example.com", "pw").await.unwrap();
    assert_eq!(identity.provider_id, "password");
    assert_eq!(*seen.lock().unwrap(), vec![None, Some("uid-ada".to_string())]);
    session.disconnect();
}

#[tokio::test]
async fn dismissed_google_popup_is_canceled() {
    let server = MockServer::start_async().await;
    let session = session_for(&server, &unique_project("rest-popup"));

    let err = session.google_sign_in().await.unwrap_err();
    assert_eq!(err.code, OrmErrorCode::Canceled);
    assert_eq!(err.message(), SIGN_IN_CANCELED_MESSAGE);
    session.disconnect();
}

#[tokio::test]
async fn signed_in_session_authenticates_document_requests() {
    let server = MockServer::start_async().await;
    let project = unique_project("rest-token");
    let document = format!("/v1/projects/{project}/databases/(default)/documents/people/ada");
    server
        .mock_async(|when, then| {
            when.method(POST).path_contains("accounts:signInWithPassword");
            then.status(200).json_body(json!({
                "localId": "uid-ada",
                "email": "ada@example.com",
                "idToken": "ID-TOKEN-123",
                "refreshToken": "refresh-token"
            }));
        })
        .await;
    let authed = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(document.as_str())
                .header("Authorization", "Bearer ID-TOKEN-123");
            then.status(200).json_body(json!({
                "name": format!("projects/{project}/databases/(default)/documents/people/ada"),
                "fields": { "name": { "stringValue": "Ada" } }
            }));
        })
        .await;
    let anonymous = server
        .mock_async(|when, then| {
            when.method(GET).path(document.as_str());
            then.status(403).json_body(json!({
                "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
            }));
        })
        .await;

    let session = session_for(&server, &project);
    let mapping = session.mapping(people());
    let err = mapping.fetch("ada").await.unwrap_err();
    assert_eq!(err.status, Some(403));

    session.email_sign_in("ada@example.com", "pw").await.unwrap();
    let record = mapping.fetch("ada").await.unwrap();
    assert_eq!(record.get("name").and_then(FieldValue::as_str), Some("Ada"));
    authed.assert_hits_async(1).await;
    anonymous.assert_hits_async(1).await;

    session.sign_out().await.unwrap();
    assert!(mapping.fetch("ada").await.is_err());
    anonymous.assert_hits_async(2).await;
    session.disconnect();
}
