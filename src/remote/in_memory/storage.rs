use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::error::{not_found, transport_error, OrmResult};
use crate::platform::runtime::sleep;
use crate::remote::{ChunkStatus, FileStorage, UploadSession, DEFAULT_UPLOAD_CHUNK_SIZE};

struct PendingUpload {
    path: String,
    buffer: Vec<u8>,
    total_bytes: u64,
}

#[derive(Default)]
struct StorageState {
    objects: HashMap<String, (Bytes, String)>,
    pending: HashMap<String, PendingUpload>,
    fail_at_offset: Option<u64>,
}

/// File storage double that keeps finished objects in memory.
#[derive(Clone)]
pub struct InMemoryFileStorage {
    bucket: String,
    chunk_size: usize,
    chunk_delay: Duration,
    state: Arc<Mutex<StorageState>>,
}

impl Default for InMemoryFileStorage {
    fn default() -> Self {
        Self::new("in-memory.appspot.com")
    }
}

impl InMemoryFileStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(StorageState::default())),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delays every accepted chunk, which makes pause/cancel timing observable.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Rejects the chunk that starts at `offset`.
    pub fn fail_at_offset(&self, offset: u64) {
        self.state.lock().unwrap().fail_at_offset = Some(offset);
    }

    /// Number of started uploads that were neither finalized nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state.objects.get(path).map(|(data, _)| data.clone())
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn start_upload(&self, path: &str, total_bytes: u64) -> OrmResult<UploadSession> {
        let upload_url = format!("memory://upload/{}", random_token(24));
        let mut state = self.state.lock().unwrap();
        state.pending.insert(
            upload_url.clone(),
            PendingUpload {
                path: path.to_string(),
                buffer: Vec::with_capacity(total_bytes as usize),
                total_bytes,
            },
        );
        Ok(UploadSession {
            path: path.to_string(),
            upload_url,
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
        sleep(self.chunk_delay).await;

        let mut state = self.state.lock().unwrap();
        if state.fail_at_offset == Some(offset) {
            return Err(transport_error(format!(
                "Upload of '{}' failed at offset {offset}",
                session.path
            ))
            .with_status(503));
        }

        let pending = state
            .pending
            .get_mut(&session.upload_url)
            .ok_or_else(|| not_found(format!("Unknown upload session '{}'", session.upload_url)))?;
        if pending.buffer.len() as u64 != offset {
            return Err(transport_error(format!(
                "Chunk offset {offset} does not match the {} bytes received",
                pending.buffer.len()
            )));
        }
        pending.buffer.extend_from_slice(&chunk);
        let bytes_transferred = pending.buffer.len() as u64;
        if bytes_transferred > pending.total_bytes {
            return Err(transport_error("Upload exceeded its declared size"));
        }

        if finalize {
            if let Some(done) = state.pending.remove(&session.upload_url) {
                let token = random_token(36);
                state
                    .objects
                    .insert(done.path, (Bytes::from(done.buffer), token));
            }
        }

        Ok(ChunkStatus {
            bytes_transferred,
            finalized: finalize,
        })
    }

    async fn abort_upload(&self, session: &UploadSession) -> OrmResult<()> {
        self.state.lock().unwrap().pending.remove(&session.upload_url);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> OrmResult<String> {
        let state = self.state.lock().unwrap();
        let (_, token) = state
            .objects
            .get(path)
            .ok_or_else(|| not_found(format!("Object '{path}' does not exist")))?;
        Ok(format!(
            "memory://{}/o/{}?alt=media&token={token}",
            self.bucket,
            utf8_percent_encode(path, NON_ALPHANUMERIC)
        ))
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

fn random_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
