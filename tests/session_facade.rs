use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use firebase_orm::app::ConnectionConfig;
use firebase_orm::remote::{
    InMemoryAuthBackend, InMemoryDocumentStore, InMemoryFileStorage, Identity,
};
use firebase_orm::schema::{DocumentSchema, FieldSchema};
use firebase_orm::session::{
    Session, UploadActions, UploadEvent, UploadState, SIGN_IN_CANCELED_MESSAGE,
};
use futures::StreamExt;

fn unique_app_id(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

struct Fixture {
    session: Session,
    auth: InMemoryAuthBackend,
    storage: InMemoryFileStorage,
}

fn fixture(prefix: &str, google_enabled: bool, storage: InMemoryFileStorage) -> Fixture {
    let auth = InMemoryAuthBackend::new();
    let session = Session::builder(
        ConnectionConfig::new(unique_app_id(prefix), "key").with_google_enabled(google_enabled),
    )
    .with_document_store(Arc::new(InMemoryDocumentStore::new()))
    .with_auth_backend(Arc::new(auth.clone()))
    .with_file_storage(Arc::new(storage.clone()))
    .build()
    .unwrap();
    Fixture {
        session,
        auth,
        storage,
    }
}

fn uid_log(session: &Session) -> Arc<Mutex<Vec<Option<String>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.subscribe_auth_state(move |identity: Option<&Identity>| {
        sink.lock().unwrap().push(identity.and_then(|identity| identity.email.clone()));
    });
    seen
}

#[tokio::test]
async fn auth_state_fires_immediately_and_on_every_transition() {
    let Fixture { session, auth, .. } = fixture("auth-state", false, InMemoryFileStorage::default());
    let seen = uid_log(&session);
    assert_eq!(*seen.lock().unwrap(), vec![None]);

    session.email_register("ada@example.com", "secret-1").await.unwrap();
    session.sign_out().await.unwrap();
    session.email_sign_in("ADA@example.com", "secret-1").await.unwrap();

    let email = Some("ada@example.com".to_string());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![None, email.clone(), None, email.clone()]
    );
    assert_eq!(auth.sign_out_count(), 1);

    let late = uid_log(&session);
    assert_eq!(*late.lock().unwrap(), vec![email]);
}

#[tokio::test]
async fn email_failures_carry_provider_errors_and_keep_state() {
    let Fixture { session, .. } = fixture("email-errors", false, InMemoryFileStorage::default());
    let seen = uid_log(&session);

    let err = session.email_register("grace@example.com", "123").await.unwrap_err();
    assert_eq!(err.code_str(), "orm/transport");
    assert_eq!(err.provider_code.as_deref(), Some("auth/weak-password"));

    let err = session.email_sign_in("nobody@example.com", "whatever").await.unwrap_err();
    assert_eq!(err.provider_code.as_deref(), Some("auth/user-not-found"));
    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn canceled_popup_always_yields_the_fixed_message() {
    let Fixture { session, auth, .. } = fixture("popup", true, InMemoryFileStorage::default());
    for code in ["auth/popup-closed-by-user", "auth/cancelled-popup-request", "auth/user-cancelled"] {
        auth.set_popup_failure(code, format!("raw message for {code}"));
        let err = session.google_sign_in().await.unwrap_err();
        assert_eq!(err.code_str(), "orm/canceled");
        assert_eq!(err.message(), SIGN_IN_CANCELED_MESSAGE);
    }
    assert!(session.current_identity().is_none());
}

#[test]
fn sessions_for_one_app_share_backends() {
    let Fixture { session, .. } = fixture("shared", false, InMemoryFileStorage::default());
    let again = Session::builder(ConnectionConfig::new(session.app_id(), "key"))
        .build()
        .unwrap();
    assert!(Arc::ptr_eq(&session.document_store(), &again.document_store()));
    assert!(Arc::ptr_eq(&session.file_storage(), &again.file_storage()));

    let schema = DocumentSchema::builder("notes")
        .field("body", FieldSchema::string())
        .build()
        .unwrap();
    let mapping = firebase_orm::document::DocumentMapping::new(
        schema,
        Some(ConnectionConfig::new(session.app_id(), "key")),
    )
    .unwrap();
    assert!(Arc::ptr_eq(
        &mapping.session().document_store(),
        &session.document_store()
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_upload_reports_progress_then_one_completion() {
    let Fixture { session, storage, .. } =
        fixture("upload-ok", false, InMemoryFileStorage::default().with_chunk_size(3));
    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = completions.clone();
    let actions = UploadActions::new().on_complete(move |task_id, url| {
        sink.lock().unwrap().push((task_id.to_string(), url.to_string()));
    });

    let handle = session.upload("avatars/ada.png", b"0123456789".to_vec(), "avatar", Some(actions));
    let events: Vec<UploadEvent> = handle.events().collect().await;

    let mut last = 0.0;
    for event in &events[..events.len() - 1] {
        match event {
            UploadEvent::Progress { task_id, percent } => {
                assert_eq!(task_id, "avatar");
                assert!(*percent >= last);
                last = *percent;
            }
            other => panic!("unexpected event before completion: {other:?}"),
        }
    }
    assert_eq!(last, 100.0);
    let url = match events.last() {
        Some(UploadEvent::Complete { download_url, .. }) => download_url.clone(),
        other => panic!("upload did not complete: {other:?}"),
    };
    assert_eq!(handle.wait().await.unwrap(), url);
    assert_eq!(*completions.lock().unwrap(), vec![("avatar".to_string(), url)]);
    assert_eq!(storage.object("avatars/ada.png").unwrap().as_ref(), b"0123456789");
}

#[tokio::test(flavor = "multi_thread")]
async fn paused_upload_resumes_and_canceled_upload_fails() {
    let storage = InMemoryFileStorage::default()
        .with_chunk_size(2)
        .with_chunk_delay(Duration::from_millis(10));
    let Fixture { session, .. } = fixture("upload-control", false, storage);

    let paused = Arc::new(Mutex::new(Vec::new()));
    let sink = paused.clone();
    let actions = UploadActions::new().on_paused(move |task_id, percent| {
        sink.lock().unwrap().push((task_id.to_string(), percent));
    });
    let handle = session.upload("logs/a.txt", vec![7u8; 8], "logs", Some(actions));
    assert!(handle.pause());
    loop {
        match handle.next_event().await {
            Some(UploadEvent::Paused { .. }) => break,
            Some(UploadEvent::Progress { .. }) => continue,
            other => panic!("expected the upload to pause, got {other:?}"),
        }
    }
    assert_eq!(handle.state(), UploadState::Paused);
    assert!(handle.resume());
    handle.wait().await.unwrap();
    assert_eq!(paused.lock().unwrap().len(), 1);

    let handle = session.upload("logs/b.txt", vec![1u8; 8], "cancel-me", None);
    assert!(handle.cancel());
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.code_str(), "orm/canceled");
    assert_eq!(handle.state(), UploadState::Canceled);
    let events: Vec<UploadEvent> = handle.events().collect().await;
    assert!(matches!(events.last(), Some(UploadEvent::Error { .. })));
}

#[tokio::test]
async fn failed_upload_never_completes() {
    let storage = InMemoryFileStorage::default().with_chunk_size(4);
    storage.fail_at_offset(4);
    let Fixture { session, .. } = fixture("upload-fail", false, storage);

    let handle = session.upload("big.bin", vec![0u8; 10], "big", None);
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.status, Some(503));

    let events: Vec<UploadEvent> = handle.events().collect().await;
    assert!(events
        .iter()
        .all(|event| !matches!(event, UploadEvent::Complete { .. })));
    assert!(matches!(events.last(), Some(UploadEvent::Error { task_id, .. }) if task_id == "big"));
}
