//! Session facade over one connection to the remote services.
//!
//! Sessions are registered per app id: building a second session for the same
//! app id hands back the existing one, so every document mapping created from
//! the same configuration shares the same backends and signed-in identity.

mod auth_state;
mod upload;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use bytes::Bytes;

use crate::app::{resolve_config, ConnectionConfig};
use crate::document::DocumentMapping;
use crate::error::{canceled, configuration_error, OrmError, OrmErrorCode, OrmResult};
use crate::logger::Logger;
use crate::remote::{
    AuthBackend, DocumentStore, FileStorage, HttpAuthBackend, HttpDocumentStore, HttpFileStorage,
    Identity, IdentityProvider, PopupHandler,
};
use crate::schema::DocumentSchema;

pub use auth_state::AuthStateCallback;
pub use upload::{UploadActions, UploadEvent, UploadHandle, UploadState};

use auth_state::{AuthState, IdentityTokenProvider};

pub(crate) static LOGGER: LazyLock<Logger> =
    LazyLock::new(|| Logger::new("@firebase-orm/session"));

static SESSIONS: LazyLock<Mutex<HashMap<String, Session>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Message carried by the error returned when the user dismisses the provider popup.
pub const SIGN_IN_CANCELED_MESSAGE: &str = "Sign in was canceled by the user.";

const CANCELED_PROVIDER_CODES: &[&str] = &[
    "auth/popup-closed-by-user",
    "auth/cancelled-popup-request",
    "auth/user-cancelled",
];

struct SessionInner {
    config: ConnectionConfig,
    documents: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthBackend>,
    storage: Arc<dyn FileStorage>,
    google_provider: Option<IdentityProvider>,
    auth_state: Arc<AuthState>,
}

/// Shared handle on the backends of one app.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("app_id", &self.inner.config.app_id)
            .field("google_enabled", &self.inner.google_provider.is_some())
            .finish()
    }
}

/// Configures the backends of a new session.
///
/// Backends that are not supplied default to the REST implementations, which
/// authenticate with the ID token of the session's signed-in identity.
pub struct SessionBuilder {
    config: ConnectionConfig,
    documents: Option<Arc<dyn DocumentStore>>,
    auth: Option<Arc<dyn AuthBackend>>,
    storage: Option<Arc<dyn FileStorage>>,
    popup_handler: Option<Arc<dyn PopupHandler>>,
}

impl SessionBuilder {
    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    pub fn with_auth_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth = Some(backend);
        self
    }

    pub fn with_file_storage(mut self, storage: Arc<dyn FileStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Used by the default REST auth backend for provider sign-in.
    pub fn with_popup_handler(mut self, handler: Arc<dyn PopupHandler>) -> Self {
        self.popup_handler = Some(handler);
        self
    }

    /// Returns the registered session for the app id, or registers a new one.
    pub fn build(self) -> OrmResult<Session> {
        self.config.validate()?;
        let mut sessions = SESSIONS.lock().unwrap();
        if let Some(existing) = sessions.get(&self.config.app_id) {
            if existing.inner.config != self.config {
                LOGGER.warn(format!(
                    "Session for app '{}' already exists with different options; reusing it",
                    self.config.app_id
                ));
            }
            return Ok(existing.clone());
        }

        let config = self.config;
        let auth_state = Arc::new(AuthState::default());
        let tokens = Arc::new(IdentityTokenProvider::new(auth_state.clone()));
        let documents = self.documents.unwrap_or_else(|| {
            Arc::new(HttpDocumentStore::new(&config).with_token_provider(tokens.clone()))
        });
        let auth = match self.auth {
            Some(auth) => auth,
            None => {
                let mut backend = HttpAuthBackend::new(&config);
                if let Some(handler) = self.popup_handler {
                    backend = backend.with_popup_handler(handler);
                }
                Arc::new(backend)
            }
        };
        let storage = self.storage.unwrap_or_else(|| {
            Arc::new(HttpFileStorage::new(&config).with_token_provider(tokens))
        });
        let google_provider = config.google_enabled.then(IdentityProvider::google);

        let session = Session {
            inner: Arc::new(SessionInner {
                config,
                documents,
                auth,
                storage,
                google_provider,
                auth_state,
            }),
        };
        LOGGER.debug(format!("Registered session for app '{}'", session.app_id()));
        sessions.insert(session.app_id().to_string(), session.clone());
        Ok(session)
    }
}

impl Session {
    pub fn builder(config: ConnectionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            documents: None,
            auth: None,
            storage: None,
            popup_handler: None,
        }
    }

    /// Connects with `config`, falling back to the process default and then the environment.
    pub fn connect(config: Option<ConnectionConfig>) -> OrmResult<Self> {
        let config = resolve_config(config)?;
        Self::builder(config).build()
    }

    /// Looks up the registered session for `app_id`.
    pub fn get(app_id: &str) -> Option<Self> {
        SESSIONS.lock().unwrap().get(app_id).cloned()
    }

    /// Unregisters this session. Clones stay usable; later builds create a fresh session.
    pub fn disconnect(&self) -> bool {
        let mut sessions = SESSIONS.lock().unwrap();
        match sessions.get(self.app_id()) {
            Some(existing) if Arc::ptr_eq(&existing.inner, &self.inner) => {
                sessions.remove(self.app_id());
                true
            }
            _ => false,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn app_id(&self) -> &str {
        &self.inner.config.app_id
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        self.inner.documents.clone()
    }

    pub fn file_storage(&self) -> Arc<dyn FileStorage> {
        self.inner.storage.clone()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.inner.auth_state.current()
    }

    /// Document mapping for `schema` bound to this session.
    pub fn mapping(&self, schema: DocumentSchema) -> DocumentMapping {
        DocumentMapping::with_session(schema, self.clone())
    }

    /// Calls `callback` now with the current identity and after every sign-in or sign-out.
    pub fn subscribe_auth_state<F>(&self, callback: F)
    where
        F: Fn(Option<&Identity>) + Send + Sync + 'static,
    {
        self.inner.auth_state.subscribe(Arc::new(callback));
    }

    pub async fn sign_out(&self) -> OrmResult<()> {
        self.inner.auth.sign_out().await?;
        self.inner.auth_state.set(None);
        Ok(())
    }

    /// Signs in through the Google popup flow.
    ///
    /// A dismissed popup fails with `orm/canceled` and [`SIGN_IN_CANCELED_MESSAGE`].
    pub async fn google_sign_in(&self) -> OrmResult<Identity> {
        let provider = self.inner.google_provider.as_ref().ok_or_else(|| {
            configuration_error(format!(
                "Google sign-in is not enabled for app '{}'",
                self.app_id()
            ))
        })?;
        let identity = self
            .inner
            .auth
            .sign_in_with_provider(provider)
            .await
            .map_err(map_popup_error)?;
        Ok(self.signed_in(identity))
    }

    pub async fn email_sign_in(&self, email: &str, password: &str) -> OrmResult<Identity> {
        let identity = self.inner.auth.sign_in_with_email(email, password).await?;
        Ok(self.signed_in(identity))
    }

    pub async fn email_register(&self, email: &str, password: &str) -> OrmResult<Identity> {
        let identity = self.inner.auth.register_with_email(email, password).await?;
        Ok(self.signed_in(identity))
    }

    /// Starts a background upload of `data` to `path`.
    pub fn upload(
        &self,
        path: impl Into<String>,
        data: impl Into<Bytes>,
        task_id: impl Into<String>,
        actions: Option<UploadActions>,
    ) -> UploadHandle {
        upload::start_upload(
            self.inner.storage.clone(),
            path.into(),
            data.into(),
            task_id.into(),
            actions,
        )
    }

    fn signed_in(&self, identity: Identity) -> Identity {
        self.inner.auth_state.set(Some(identity.clone()));
        identity
    }
}

fn map_popup_error(err: OrmError) -> OrmError {
    let dismissed = err.code == OrmErrorCode::Canceled
        || err
            .provider_code
            .as_deref()
            .is_some_and(|code| CANCELED_PROVIDER_CODES.contains(&code));
    if !dismissed {
        return err;
    }
    let mut mapped = canceled(SIGN_IN_CANCELED_MESSAGE);
    if let Some(code) = err.provider_code {
        mapped = mapped.with_provider_code(code);
    }
    mapped
}
