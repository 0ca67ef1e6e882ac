use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Method};
use serde_json::json;
use url::form_urlencoded;

use crate::app::ConnectionConfig;
use crate::error::{transport_error, OrmResult};
use crate::remote::{
    ChunkStatus, FileStorage, TokenProviderArc, UploadSession, DEFAULT_UPLOAD_CHUNK_SIZE,
};

use super::connection::{header_value, AuthScheme, Connection};
use super::rpc_error::map_http_error;

const STORAGE_API_VERSION: &str = "v0";
const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// File storage backed by the Firebase Storage v0 resumable upload protocol.
#[derive(Clone, Debug)]
pub struct HttpFileStorage {
    connection: Connection,
    api_key: String,
    chunk_size: usize,
}

impl HttpFileStorage {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: &ConnectionConfig, client: Client) -> Self {
        let base_url = format!(
            "{}/{STORAGE_API_VERSION}/b/{}/o",
            config.storage_base_url(),
            utf8_percent_encode(&config.storage_bucket(), NON_ALPHANUMERIC)
        );
        Self {
            connection: Connection::new(client, base_url),
            api_key: config.api_key.clone(),
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }

    /// Sends the provider's ID token as a `Firebase` credential.
    pub fn with_token_provider(mut self, provider: TokenProviderArc) -> Self {
        self.connection = self.connection.with_token_provider(provider, AuthScheme::Firebase);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn object_url(&self, path: &str) -> String {
        self.connection.url(&object_path(path))
    }
}

fn object_path(path: &str) -> String {
    utf8_percent_encode(path, NON_ALPHANUMERIC).to_string()
}

fn upload_command(finalize: bool, empty_chunk: bool) -> &'static str {
    match (finalize, empty_chunk) {
        (true, true) => "finalize",
        (true, false) => "upload, finalize",
        (false, _) => "upload",
    }
}

#[async_trait]
impl FileStorage for HttpFileStorage {
    async fn start_upload(&self, path: &str, total_bytes: u64) -> OrmResult<UploadSession> {
        let request = self
            .connection
            .client()
            .request(Method::POST, self.connection.base_url())
            .query(&[
                ("uploadType", "resumable"),
                ("name", path),
                ("key", self.api_key.as_str()),
            ])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", total_bytes.to_string())
            .header("X-Goog-Upload-Header-Content-Type", UPLOAD_CONTENT_TYPE)
            .json(&json!({ "name": path, "contentType": UPLOAD_CONTENT_TYPE }));
        let response = self.connection.send(request).await?;
        if !response.status.is_success() {
            return Err(map_http_error(response.status, &response.body));
        }

        let status = header_value(&response.headers, "X-Goog-Upload-Status")
            .ok_or_else(|| transport_error("missing resumable upload status header"))?;
        if !matches!(status.to_ascii_lowercase().as_str(), "active" | "final") {
            return Err(transport_error(format!("unexpected resumable upload status: {status}")));
        }
        let upload_url = header_value(&response.headers, "X-Goog-Upload-URL")
            .ok_or_else(|| transport_error("missing resumable upload url"))?;

        Ok(UploadSession {
            path: path.to_string(),
            upload_url: upload_url.to_string(),
            total_bytes,
        })
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        chunk: Bytes,
        finalize: bool,
    ) -> OrmResult<ChunkStatus> {
        let chunk_len = chunk.len() as u64;
        let request = self
            .connection
            .client()
            .request(Method::POST, session.upload_url.as_str())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", upload_command(finalize, chunk.is_empty()))
            .header("X-Goog-Upload-Offset", offset.to_string())
            .header("Content-Type", UPLOAD_CONTENT_TYPE)
            .body(chunk);
        let response = self.connection.send(request).await?;
        if !response.status.is_success() {
            return Err(map_http_error(response.status, &response.body));
        }

        let status = header_value(&response.headers, "X-Goog-Upload-Status")
            .ok_or_else(|| transport_error("missing resumable upload status header"))?;
        let finalized = match status.to_ascii_lowercase().as_str() {
            "final" => true,
            "active" => false,
            other => {
                return Err(transport_error(format!("unexpected resumable upload status: {other}")))
            }
        };
        if finalize && !finalized {
            return Err(transport_error("upload was not finalized by the server"));
        }

        Ok(ChunkStatus {
            bytes_transferred: offset + chunk_len,
            finalized,
        })
    }

    async fn abort_upload(&self, session: &UploadSession) -> OrmResult<()> {
        let request = self
            .connection
            .client()
            .request(Method::POST, session.upload_url.as_str())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "cancel");
        let response = self.connection.send(request).await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(map_http_error(response.status, &response.body))
        }
    }

    async fn download_url(&self, path: &str) -> OrmResult<String> {
        let metadata = self
            .connection
            .invoke_json(
                Method::GET,
                &object_path(path),
                &[("key", self.api_key.clone())],
                None,
            )
            .await?;
        let token = metadata
            .get("downloadTokens")
            .and_then(|value| value.as_str())
            .and_then(|tokens| tokens.split(',').find(|segment| !segment.is_empty()))
            .ok_or_else(|| transport_error(format!("Object '{path}' has no download token")))?;
        let encoded_token: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
        Ok(format!("{}?alt=media&token={encoded_token}", self.object_url(path)))
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
