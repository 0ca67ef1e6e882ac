//! Client abstraction over the managed document, identity and file services.
//!
//! Each service is reached through an async trait so sessions can run against the
//! REST implementations in [`http`] or the in-process doubles in [`in_memory`].

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::OrmResult;
use crate::logger::Logger;
use crate::query::QueryDefinition;
use crate::value::FieldMap;

pub mod http;
pub mod in_memory;

pub(crate) static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-orm/remote"));

/// Chunk size used by resumable uploads unless the storage backend says otherwise.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// A single remote document as returned by the document store.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    collection: String,
    key: String,
    data: Option<FieldMap>,
}

impl DocumentSnapshot {
    pub fn new(collection: impl Into<String>, key: impl Into<String>, data: Option<FieldMap>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            data,
        }
    }

    pub fn missing(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(collection, key, None)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&FieldMap> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<FieldMap> {
        self.data
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Loads `collection/key`; a missing document is reported through [`DocumentSnapshot::exists`].
    async fn get_document(&self, collection: &str, key: &str) -> OrmResult<DocumentSnapshot>;

    /// Writes `data` to `collection/key` and returns the document as stored.
    ///
    /// With `merge` only the fields present in `data` are touched and the document is
    /// created when missing; otherwise the document is replaced.
    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        data: FieldMap,
        merge: bool,
    ) -> OrmResult<DocumentSnapshot>;

    /// Creates a document with a store-assigned key.
    async fn add_document(&self, collection: &str, data: FieldMap) -> OrmResult<DocumentSnapshot>;

    async fn run_query(&self, query: &QueryDefinition) -> OrmResult<Vec<DocumentSnapshot>>;
}

/// A signed-in user as reported by the identity service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Sign-in method, e.g. `password` or `google.com`.
    pub provider_id: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// An external identity provider used for popup sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityProvider {
    provider_id: String,
    scopes: Vec<String>,
    custom_parameters: BTreeMap<String, String>,
}

impl IdentityProvider {
    pub const GOOGLE_PROVIDER_ID: &'static str = "google.com";

    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            scopes: Vec::new(),
            custom_parameters: BTreeMap::new(),
        }
    }

    pub fn google() -> Self {
        Self::new(Self::GOOGLE_PROVIDER_ID)
            .with_scope("email")
            .with_scope("profile")
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    pub fn with_custom_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.insert(key.into(), value.into());
        self
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, String> {
        &self.custom_parameters
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    async fn sign_in_with_email(&self, email: &str, password: &str) -> OrmResult<Identity>;

    async fn register_with_email(&self, email: &str, password: &str) -> OrmResult<Identity>;

    /// Runs the interactive provider flow. A user dismissal should fail with an
    /// error carrying the provider's cancellation code.
    async fn sign_in_with_provider(&self, provider: &IdentityProvider) -> OrmResult<Identity>;

    async fn sign_out(&self) -> OrmResult<()>;
}

/// An open resumable upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    pub path: String,
    pub upload_url: String,
    pub total_bytes: u64,
}

/// Server-side state after a chunk was accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkStatus {
    pub bytes_transferred: u64,
    pub finalized: bool,
}

#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn start_upload(&self, path: &str, total_bytes: u64) -> OrmResult<UploadSession>;

    /// Sends `chunk` starting at `offset`. `finalize` marks the last chunk.
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        chunk: Bytes,
        finalize: bool,
    ) -> OrmResult<ChunkStatus>;

    /// Returns a durable retrieval URL for a completed object.
    async fn download_url(&self, path: &str) -> OrmResult<String>;

    /// Discards a resumable upload that will not be finished.
    async fn abort_upload(&self, _session: &UploadSession) -> OrmResult<()> {
        Ok(())
    }

    fn chunk_size(&self) -> usize {
        DEFAULT_UPLOAD_CHUNK_SIZE
    }
}

/// Supplies the ID token attached to document and storage requests.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    /// `None` sends the request unauthenticated.
    async fn get_token(&self) -> OrmResult<Option<String>>;
}

pub type TokenProviderArc = Arc<dyn TokenProvider>;

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTokenProvider;

#[async_trait]
impl TokenProvider for NoopTokenProvider {
    async fn get_token(&self) -> OrmResult<Option<String>> {
        Ok(None)
    }
}

pub use http::{HttpAuthBackend, HttpDocumentStore, HttpFileStorage, PopupHandler, PopupRequest, ProviderCredential};
pub use in_memory::{InMemoryAuthBackend, InMemoryDocumentStore, InMemoryFileStorage};
