use std::future::Future;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle};

use crate::platform::LOGGER;

/// Spawns `future` on the ambient Tokio runtime, or on a dedicated background thread
/// driving its own current-thread runtime when called outside of one.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
        return;
    }

    let spawned = thread::Builder::new()
        .name("firebase-orm-task".to_string())
        .spawn(move || match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(future),
            Err(err) => LOGGER.error(format!("Failed to build background runtime: {err}")),
        });
    if let Err(err) = spawned {
        LOGGER.error(format!("Failed to start background thread: {err}"));
    }
}

/// Asynchronously waits for the provided duration.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}
