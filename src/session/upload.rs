use std::fmt;
use std::sync::{Arc, Mutex};

use async_channel::{Receiver, Sender};
use bytes::Bytes;
use tokio::sync::{watch, Notify};

use crate::error::{canceled, configuration_error, transport_error, OrmError, OrmErrorCode, OrmResult};
use crate::platform::runtime::spawn_detached;
use crate::remote::{FileStorage, UploadSession};
use crate::session::LOGGER;

/// Execution state of an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Failed | UploadState::Canceled
        )
    }
}

/// Notifications emitted by an upload, in temporal order.
///
/// `Complete` and `Error` are terminal: exactly one of them closes the stream.
#[derive(Clone, Debug)]
pub enum UploadEvent {
    Progress { task_id: String, percent: f64 },
    Paused { task_id: String, percent: f64 },
    Error { task_id: String, error: OrmError },
    Complete { task_id: String, download_url: String },
}

impl UploadEvent {
    pub fn task_id(&self) -> &str {
        match self {
            UploadEvent::Progress { task_id, .. }
            | UploadEvent::Paused { task_id, .. }
            | UploadEvent::Error { task_id, .. }
            | UploadEvent::Complete { task_id, .. } => task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Error { .. } | UploadEvent::Complete { .. })
    }
}

type PercentCallback = Arc<dyn Fn(&str, f64) + Send + Sync + 'static>;
type ErrorCallback = Arc<dyn Fn(&str, &OrmError) + Send + Sync + 'static>;
type CompleteCallback = Arc<dyn Fn(&str, &str) + Send + Sync + 'static>;

/// Optional callbacks receiving the same notifications as the event stream.
#[derive(Clone, Default)]
pub struct UploadActions {
    progress: Option<PercentCallback>,
    paused: Option<PercentCallback>,
    error: Option<ErrorCallback>,
    complete: Option<CompleteCallback>,
}

impl fmt::Debug for UploadActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadActions")
            .field("progress", &self.progress.is_some())
            .field("paused", &self.paused.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

impl UploadActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, callback: impl Fn(&str, f64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn on_paused(mut self, callback: impl Fn(&str, f64) + Send + Sync + 'static) -> Self {
        self.paused = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&str, &OrmError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }

    pub fn on_complete(mut self, callback: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.complete = Some(Arc::new(callback));
        self
    }

    fn dispatch(&self, event: &UploadEvent) {
        match event {
            UploadEvent::Progress { task_id, percent } => {
                if let Some(callback) = &self.progress {
                    callback(task_id, *percent);
                }
            }
            UploadEvent::Paused { task_id, percent } => {
                if let Some(callback) = &self.paused {
                    callback(task_id, *percent);
                }
            }
            UploadEvent::Error { task_id, error } => {
                if let Some(callback) = &self.error {
                    callback(task_id, error);
                }
            }
            UploadEvent::Complete {
                task_id,
                download_url,
            } => {
                if let Some(callback) = &self.complete {
                    callback(task_id, download_url);
                }
            }
        }
    }
}

struct UploadControl {
    state: Mutex<UploadState>,
    wake: Notify,
}

impl UploadControl {
    fn state(&self) -> UploadState {
        *self.state.lock().unwrap()
    }

    fn transition(&self, from: &[UploadState], to: UploadState) -> bool {
        let mut state = self.state.lock().unwrap();
        if !from.contains(&*state) {
            return false;
        }
        *state = to;
        drop(state);
        self.wake.notify_waiters();
        true
    }

    fn finish(&self, outcome: &OrmResult<String>) {
        let mut state = self.state.lock().unwrap();
        *state = match outcome {
            Ok(_) => UploadState::Completed,
            Err(err) if err.code == OrmErrorCode::Canceled => UploadState::Canceled,
            Err(_) => UploadState::Failed,
        };
    }
}

/// Handle on a background upload.
///
/// Events are queued in a shared channel; every clone of [`UploadHandle::events`]
/// competes for the same queue.
#[derive(Clone)]
pub struct UploadHandle {
    task_id: String,
    control: Arc<UploadControl>,
    events: Receiver<UploadEvent>,
    result: watch::Receiver<Option<OrmResult<String>>>,
}

impl fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadHandle")
            .field("task_id", &self.task_id)
            .field("state", &self.state())
            .finish()
    }
}

impl UploadHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn state(&self) -> UploadState {
        self.control.state()
    }

    /// Suspends the transfer at the next chunk boundary. Returns `false` unless running.
    pub fn pause(&self) -> bool {
        self.control
            .transition(&[UploadState::Running], UploadState::Paused)
    }

    pub fn resume(&self) -> bool {
        self.control
            .transition(&[UploadState::Paused], UploadState::Running)
    }

    /// Aborts the transfer; the stream ends with an `Error` carrying `orm/canceled`.
    pub fn cancel(&self) -> bool {
        self.control.transition(
            &[UploadState::Running, UploadState::Paused],
            UploadState::Canceled,
        )
    }

    /// Stream of notifications, usable with `futures::StreamExt`.
    pub fn events(&self) -> Receiver<UploadEvent> {
        self.events.clone()
    }

    /// Next queued notification, or `None` once the stream is exhausted.
    pub async fn next_event(&self) -> Option<UploadEvent> {
        self.events.recv().await.ok()
    }

    /// Waits for the terminal outcome: the download URL or the failure.
    pub async fn wait(&self) -> OrmResult<String> {
        let mut result = self.result.clone();
        loop {
            if let Some(outcome) = result.borrow_and_update().clone() {
                return outcome;
            }
            if result.changed().await.is_err() {
                return Err(transport_error("Upload task ended without reporting a result"));
            }
        }
    }

    /// Blocking form of [`UploadHandle::wait`] for callers outside an async context.
    ///
    /// Must not be called from a runtime thread that drives the upload itself.
    pub fn wait_blocking(&self) -> OrmResult<String> {
        futures::executor::block_on(self.wait())
    }
}

pub(crate) fn start_upload(
    storage: Arc<dyn FileStorage>,
    path: String,
    data: Bytes,
    task_id: String,
    actions: Option<UploadActions>,
) -> UploadHandle {
    let control = Arc::new(UploadControl {
        state: Mutex::new(UploadState::Running),
        wake: Notify::new(),
    });
    let (event_tx, event_rx) = async_channel::unbounded();
    let (result_tx, result_rx) = watch::channel(None);

    let driver = UploadDriver {
        storage,
        path,
        data,
        task_id: task_id.clone(),
        control: control.clone(),
        events: event_tx,
        actions: actions.unwrap_or_default(),
        result: result_tx,
    };
    spawn_detached(driver.run());

    UploadHandle {
        task_id,
        control,
        events: event_rx,
        result: result_rx,
    }
}

struct UploadDriver {
    storage: Arc<dyn FileStorage>,
    path: String,
    data: Bytes,
    task_id: String,
    control: Arc<UploadControl>,
    events: Sender<UploadEvent>,
    actions: UploadActions,
    result: watch::Sender<Option<OrmResult<String>>>,
}

impl UploadDriver {
    async fn run(self) {
        let outcome = self.transfer().await;
        self.control.finish(&outcome);
        let event = match &outcome {
            Ok(download_url) => UploadEvent::Complete {
                task_id: self.task_id.clone(),
                download_url: download_url.clone(),
            },
            Err(error) => {
                LOGGER.warn(format!("Upload '{}' to '{}' failed: {error}", self.task_id, self.path));
                UploadEvent::Error {
                    task_id: self.task_id.clone(),
                    error: error.clone(),
                }
            }
        };
        self.emit(event);
        self.events.close();
        let _ = self.result.send(Some(outcome));
    }

    async fn transfer(&self) -> OrmResult<String> {
        if self.path.trim().is_empty() {
            return Err(configuration_error("Upload path must not be empty"));
        }
        let total = self.data.len() as u64;
        self.checkpoint(0).await?;
        let session = self.storage.start_upload(&self.path, total).await?;
        if let Err(error) = self.send_chunks(&session).await {
            if let Err(abort_error) = self.storage.abort_upload(&session).await {
                LOGGER.debug(format!(
                    "Could not abort upload session for '{}': {abort_error}",
                    self.path
                ));
            }
            return Err(error);
        }

        if self.control.state() == UploadState::Canceled {
            return Err(canceled("Upload was canceled"));
        }
        self.storage.download_url(&self.path).await
    }

    async fn send_chunks(&self, session: &UploadSession) -> OrmResult<()> {
        let total = session.total_bytes;
        let chunk_size = self.storage.chunk_size().max(1) as u64;
        let mut offset = 0u64;
        loop {
            self.checkpoint(offset).await?;
            let end = (offset + chunk_size).min(total);
            let finalize = end == total;
            let chunk = self.data.slice(offset as usize..end as usize);
            let status = self
                .storage
                .upload_chunk(session, offset, chunk, finalize)
                .await?;
            if status.bytes_transferred <= offset && !status.finalized {
                return Err(transport_error(format!(
                    "Upload of '{}' made no progress at offset {offset}",
                    self.path
                )));
            }
            offset = status.bytes_transferred.min(total);
            self.emit(UploadEvent::Progress {
                task_id: self.task_id.clone(),
                percent: percent(offset, total),
            });
            if status.finalized {
                return Ok(());
            }
        }
    }

    /// Blocks while paused and fails once canceled.
    async fn checkpoint(&self, transferred: u64) -> OrmResult<()> {
        let mut paused = false;
        loop {
            let woken = self.control.wake.notified();
            match self.control.state() {
                UploadState::Canceled => return Err(canceled("Upload was canceled")),
                UploadState::Paused => {
                    if !paused {
                        paused = true;
                        self.emit(UploadEvent::Paused {
                            task_id: self.task_id.clone(),
                            percent: percent(transferred, self.data.len() as u64),
                        });
                    }
                    woken.await;
                }
                _ => {
                    if paused {
                        self.emit(UploadEvent::Progress {
                            task_id: self.task_id.clone(),
                            percent: percent(transferred, self.data.len() as u64),
                        });
                    }
                    return Ok(());
                }
            }
        }
    }

    fn emit(&self, event: UploadEvent) {
        self.actions.dispatch(&event);
        if self.events.try_send(event).is_err() {
            LOGGER.debug(format!("Dropped upload event for '{}'", self.task_id));
        }
    }
}

fn percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        transferred as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryFileStorage;
    use std::time::Duration;

    fn storage(chunk_size: usize) -> (InMemoryFileStorage, Arc<dyn FileStorage>) {
        let storage = InMemoryFileStorage::default().with_chunk_size(chunk_size);
        let shared: Arc<dyn FileStorage> = Arc::new(storage.clone());
        (storage, shared)
    }

    async fn drain(handle: &UploadHandle) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_complete_is_last() {
        let (inner, storage) = storage(4);
        let handle = start_upload(
            storage,
            "docs/a.txt".to_string(),
            Bytes::from_static(b"0123456789"),
            "task-1".to_string(),
            None,
        );
        let url = handle.wait().await.unwrap();
        let events = drain(&handle).await;

        let percents: Vec<f64> = events
            .iter()
            .filter_map(|event| match event {
                UploadEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![40.0, 80.0, 100.0]);
        match events.last() {
            Some(UploadEvent::Complete { task_id, download_url }) => {
                assert_eq!(task_id, "task-1");
                assert_eq!(download_url, &url);
            }
            other => panic!("unexpected final event {other:?}"),
        }
        assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
        assert_eq!(handle.state(), UploadState::Completed);
        assert_eq!(inner.object("docs/a.txt").unwrap().len(), 10);
    }

    #[test]
    fn blocking_wait_outside_of_a_runtime() {
        let (inner, storage) = storage(3);
        let handle = start_upload(
            storage,
            "docs/sync.txt".to_string(),
            Bytes::from_static(b"abcdefg"),
            "sync".to_string(),
            None,
        );
        let url = handle.wait_blocking().unwrap();
        assert!(url.starts_with("memory://"));
        assert_eq!(inner.object("docs/sync.txt").unwrap().len(), 7);
    }

    #[tokio::test]
    async fn empty_upload_reports_full_progress() {
        let (_, storage) = storage(4);
        let handle = start_upload(storage, "empty.bin".to_string(), Bytes::new(), "t".to_string(), None);
        handle.wait().await.unwrap();
        let events = drain(&handle).await;
        assert!(matches!(events[0], UploadEvent::Progress { percent, .. } if percent == 100.0));
    }

    #[tokio::test]
    async fn pause_then_resume_completes() {
        let (_, storage) = storage(2);
        let handle = start_upload(
            storage,
            "docs/b.txt".to_string(),
            Bytes::from_static(b"abcdef"),
            "task-2".to_string(),
            None,
        );
        assert!(handle.pause());
        let first = handle.next_event().await.unwrap();
        assert!(matches!(first, UploadEvent::Paused { percent, .. } if percent == 0.0));
        assert_eq!(handle.state(), UploadState::Paused);
        assert!(handle.resume());
        handle.wait().await.unwrap();
        assert_eq!(handle.state(), UploadState::Completed);
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn cancel_ends_with_canceled_error() {
        let inner = InMemoryFileStorage::default()
            .with_chunk_size(1)
            .with_chunk_delay(Duration::from_millis(5));
        let handle = start_upload(
            Arc::new(inner),
            "docs/c.txt".to_string(),
            Bytes::from_static(b"abcdefgh"),
            "task-3".to_string(),
            None,
        );
        assert!(handle.cancel());
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.code_str(), "orm/canceled");
        let events = drain(&handle).await;
        assert!(matches!(events.last(), Some(UploadEvent::Error { .. })));
        assert_eq!(handle.state(), UploadState::Canceled);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_once() {
        let (inner, storage) = storage(2);
        inner.fail_at_offset(2);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let actions = UploadActions::new().on_error(move |task_id, error| {
            sink.lock().unwrap().push((task_id.to_string(), error.code_str()));
        });
        let handle = start_upload(
            storage,
            "docs/d.txt".to_string(),
            Bytes::from_static(b"abcdef"),
            "task-4".to_string(),
            Some(actions),
        );
        assert!(handle.wait().await.is_err());
        assert_eq!(
            *errors.lock().unwrap(),
            vec![("task-4".to_string(), "orm/transport")]
        );
        assert_eq!(handle.state(), UploadState::Failed);
    }

    #[tokio::test]
    async fn cancel_mid_transfer_releases_the_upload_session() {
        let (inner, storage) = storage(2);
        let slot: Arc<Mutex<Option<UploadHandle>>> = Arc::new(Mutex::new(None));
        let canceler = slot.clone();
        let actions = UploadActions::new().on_progress(move |_, percent| {
            if percent > 0.0 {
                if let Some(handle) = canceler.lock().unwrap().as_ref() {
                    handle.cancel();
                }
            }
        });
        let handle = start_upload(
            storage,
            "docs/e.txt".to_string(),
            Bytes::from_static(b"abcdefgh"),
            "task-5".to_string(),
            Some(actions),
        );
        *slot.lock().unwrap() = Some(handle.clone());

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.code_str(), "orm/canceled");
        assert_eq!(handle.state(), UploadState::Canceled);
        assert_eq!(inner.pending_uploads(), 0);
        assert!(inner.object("docs/e.txt").is_none());
    }

    #[tokio::test]
    async fn failed_upload_releases_the_upload_session() {
        let (inner, storage) = storage(2);
        inner.fail_at_offset(4);
        let handle = start_upload(
            storage,
            "docs/f.txt".to_string(),
            Bytes::from_static(b"abcdef"),
            "task-6".to_string(),
            None,
        );
        assert!(handle.wait().await.is_err());
        assert_eq!(inner.pending_uploads(), 0);
    }
}
