//! In-process implementations of the remote traits.

mod auth;
mod document_store;
mod storage;

pub use auth::InMemoryAuthBackend;
pub use document_store::InMemoryDocumentStore;
pub use storage::InMemoryFileStorage;
