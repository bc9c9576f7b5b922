//! Queued event processing with a drain barrier
//!
//! Watch notifications arrive on the subscription's dispatch thread and are
//! queued here as asynchronous work items. A synchronization run calls
//! [`SourceHandle::drain`] before reading the event log so it never observes
//! a partially processed batch.

use crate::{SourceManager, WatchEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use twinsync_types::{Error, Result};

enum SourceMessage {
    Event(WatchEvent),
    Flush(oneshot::Sender<()>),
}

/// Cheap handle for feeding events into a running source manager task
#[derive(Debug, Clone)]
pub struct SourceHandle {
    tx: mpsc::Sender<SourceMessage>,
}

impl SourceHandle {
    /// Enqueue one raw watch event
    pub async fn notify(&self, event: WatchEvent) -> Result<()> {
        self.tx
            .send(SourceMessage::Event(event))
            .await
            .map_err(|_| Error::other("source manager task is gone"))
    }

    /// Wait until every event enqueued so far has been fully processed
    pub async fn drain(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SourceMessage::Flush(ack_tx))
            .await
            .map_err(|_| Error::other("source manager task is gone"))?;
        ack_rx
            .await
            .map_err(|_| Error::other("source manager task dropped the flush"))
    }
}

/// Spawn the processing task for `manager`. The task runs until every
/// handle is dropped, then yields the manager back.
///
/// Fatal errors (invariant violations) stop the task; per-change errors are
/// logged and skipped, matching the run-forever expectations of a watcher.
pub fn spawn(mut manager: SourceManager, queue_depth: usize) -> (SourceHandle, JoinHandle<SourceManager>) {
    let (tx, mut rx) = mpsc::channel(queue_depth);
    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                SourceMessage::Event(event) => {
                    if let Err(error) = manager.handle_event(event).await {
                        if error.is_fatal() {
                            warn!("stopping source manager on fatal error: {error}");
                            break;
                        }
                        warn!("event processing failed: {error}");
                    }
                }
                SourceMessage::Flush(ack) => {
                    debug!("event queue drained");
                    let _ = ack.send(());
                }
            }
        }
        manager
    });
    (SourceHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WatchEventKind;
    use std::sync::Arc;
    use twinsync_store::EventLog;
    use twinsync_types::path::PathMatcher;
    use twinsync_types::{EntryType, ManualClock};

    #[derive(Debug)]
    struct AllowAll;
    impl PathMatcher for AllowAll {
        fn is_match(&self, _path: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_drain_waits_for_queued_events() {
        let tmp = tempfile::TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(
            chrono::Utc::now() + chrono::Duration::seconds(60),
        ));
        let log = EventLog::new(tmp.path().join("events.log"));
        let manager =
            SourceManager::start(tmp.path(), log.clone(), clock.clone(), Arc::new(AllowAll))
                .unwrap();

        let (handle, task) = spawn(manager, 64);

        for name in ["a.txt", "b.txt", "c.txt"] {
            std::fs::write(tmp.path().join(name), b"data").unwrap();
            handle
                .notify(WatchEvent::new(name, EntryType::File, WatchEventKind::Created))
                .await
                .unwrap();
        }
        handle.drain().await.unwrap();

        assert_eq!(log.len().await.unwrap(), 3);

        drop(handle);
        let manager = task.await.unwrap();
        assert!(manager.index().lookup("c.txt").is_some());
    }
}
