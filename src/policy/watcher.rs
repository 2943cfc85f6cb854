//! Polling-based policy model watcher.
//!
//! Checks the model file's mtime every 2 seconds. When a change is detected it
//! debounces for 500ms (editors and exporters write in stages), reloads the
//! model, and swaps it into the [`PolicyHandle`]. A model that fails to load
//! leaves the previous one active.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::model::{PolicyHandle, PolicyModel};

/// Events emitted by the model watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// New model is active
    Swapped { version: String },
    /// Reload failed; previous model remains active
    Rejected(String),
}

/// Watcher timing, overridable for tests.
#[derive(Debug, Clone, Copy)]
pub struct WatchTiming {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::config::defaults::MODEL_WATCH_INTERVAL_MS),
            debounce: Duration::from_millis(crate::config::defaults::MODEL_WATCH_DEBOUNCE_MS),
        }
    }
}

/// Run the model watcher until cancelled or the event channel closes.
pub async fn run_model_watcher(
    path: PathBuf,
    handle: PolicyHandle,
    tx: mpsc::Sender<ModelEvent>,
    timing: WatchTiming,
    cancel: CancellationToken,
) {
    tracing::info!(path = %path.display(), "[ModelWatcher] Started");

    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("[ModelWatcher] Cancelled");
                return;
            }
            () = tokio::time::sleep(timing.poll_interval) => {}
        }

        let Some(current) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "[ModelWatcher] Model file not accessible, keeping current model"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(timing.debounce).await;
        if get_mtime(&path) != Some(current) {
            // Still being written; pick it up on the next poll.
            continue;
        }
        last_mtime = Some(current);

        let event = match PolicyModel::load(&path) {
            Ok(model) => {
                let version = model.version.clone();
                handle.store(Some(model));
                tracing::info!(version = %version, "[ModelWatcher] Policy model swapped");
                ModelEvent::Swapped { version }
            }
            Err(e) => {
                tracing::error!(error = %e, "[ModelWatcher] Reload failed, keeping previous model");
                ModelEvent::Rejected(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!("[ModelWatcher] Event channel closed, stopping");
            return;
        }
    }
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_model(path: &Path, version: &str) {
        let model = PolicyModel {
            version: version.to_string(),
            ..PolicyModel::builtin()
        };
        std::fs::write(path, serde_json::to_string(&model).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_swaps_model_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        write_model(&path, "v1");

        let handle = PolicyHandle::new(Some(PolicyModel::load(&path).unwrap()));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let timing = WatchTiming {
            poll_interval: Duration::from_millis(20),
            debounce: Duration::from_millis(5),
        };
        let task = tokio::spawn(run_model_watcher(path.clone(), handle.clone(), tx, timing, cancel.clone()));

        // mtime granularity can be coarse; make sure the rewrite is visible.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        write_model(&path, "v2");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event, ModelEvent::Swapped { version: "v2".to_string() });
        assert_eq!(handle.version().as_deref(), Some("v2"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_model_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        write_model(&path, "v1");

        let handle = PolicyHandle::new(Some(PolicyModel::load(&path).unwrap()));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let timing = WatchTiming {
            poll_interval: Duration::from_millis(20),
            debounce: Duration::from_millis(5),
        };
        let task = tokio::spawn(run_model_watcher(path.clone(), handle.clone(), tx, timing, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        std::fs::write(&path, r#"{"version":"v2","weights":[1.0]}"#).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, ModelEvent::Rejected(_)));
        assert_eq!(handle.version().as_deref(), Some("v1"));

        cancel.cancel();
        task.await.unwrap();
    }
}
