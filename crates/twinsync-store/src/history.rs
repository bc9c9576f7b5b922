//! Last-sync-time bookkeeping

use std::path::PathBuf;
use tracing::debug;
use twinsync_types::{format_timestamp, parse_timestamp, Error, Result};

/// Persisted record of the last successful synchronization time.
///
/// Stored as a single wire-format timestamp line; absent until the first
/// successful run.
#[derive(Debug, Clone)]
pub struct SyncHistory {
    path: PathBuf,
}

impl SyncHistory {
    /// Create a history handle for the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the last sync time; `None` means no sync has completed yet
    pub async fn read(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::store(format!(
                    "reading sync history '{}': {e}",
                    self.path.display()
                )))
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        parse_timestamp(trimmed)
            .map(Some)
            .map_err(|e| Error::store(format!("sync history '{}': {e}", self.path.display())))
    }

    /// Record a successful sync at `timestamp`
    pub async fn write(&self, timestamp: chrono::DateTime<chrono::Utc>) -> Result<()> {
        tokio::fs::write(&self.path, format_timestamp(timestamp))
            .await
            .map_err(|e| {
                Error::store(format!(
                    "writing sync history '{}': {e}",
                    self.path.display()
                ))
            })?;
        debug!("recorded sync time in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_absent_history_reads_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let history = SyncHistory::new(tmp.path().join("history"));
        assert_eq!(history.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let history = SyncHistory::new(tmp.path().join("history"));
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();

        history.write(ts).await.unwrap();
        assert_eq!(history.read().await.unwrap(), Some(ts));
    }

    #[tokio::test]
    async fn test_corrupt_history_is_a_store_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("history");
        tokio::fs::write(&path, b"garbage").await.unwrap();

        let history = SyncHistory::new(path);
        assert!(matches!(
            history.read().await,
            Err(Error::Store { .. })
        ));
    }
}
