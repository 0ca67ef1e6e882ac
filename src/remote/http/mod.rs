//! REST implementations of the remote traits.

mod auth;
pub mod connection;
mod document_store;
pub mod rpc_error;
pub mod serializer;
mod storage;

pub use auth::{HttpAuthBackend, PopupHandler, PopupRequest, ProviderCredential};
pub use document_store::HttpDocumentStore;
pub use storage::HttpFileStorage;
