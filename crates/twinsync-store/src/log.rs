//! Append-only event log

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use twinsync_types::{
    format_timestamp, parse_timestamp, ChangeProperties, Clock, EntryAction, EntryChange,
    EntryType, Error, RenameProperties, Result,
};

/// One persisted log line.
///
/// The properties blob is rename or change properties depending on the
/// action, and absent for deletes.
#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    timestamp: Option<String>,
    path: String,
    entry_type: EntryType,
    action: EntryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<serde_json::Value>,
}

impl LogRecord {
    fn from_change(change: &EntryChange) -> Result<Self> {
        let properties = match change.action() {
            EntryAction::Rename => Some(
                serde_json::to_value(change.rename_properties())
                    .map_err(|e| Error::store(format!("encoding rename properties: {e}")))?,
            ),
            EntryAction::Create | EntryAction::Change => change
                .change_properties()
                .map(|props| serde_json::to_value(props))
                .transpose()
                .map_err(|e| Error::store(format!("encoding change properties: {e}")))?,
            EntryAction::Delete => None,
        };
        Ok(Self {
            timestamp: change.timestamp().map(format_timestamp),
            path: change.old_path().to_string(),
            entry_type: change.entry_type(),
            action: change.action(),
            properties,
        })
    }

    fn into_change(self, clock: &dyn Clock) -> Result<EntryChange> {
        let timestamp = self.timestamp.as_deref().map(parse_timestamp).transpose()?;
        let (rename_properties, change_properties) = match self.action {
            EntryAction::Rename => {
                let props: RenameProperties = self.decode_properties()?;
                (Some(props), None)
            }
            EntryAction::Create | EntryAction::Change => match self.properties {
                Some(value) => {
                    let props: ChangeProperties = serde_json::from_value(value)
                        .map_err(|e| Error::store(format!("decoding change properties: {e}")))?;
                    (None, Some(props))
                }
                None => (None, None),
            },
            EntryAction::Delete => (None, None),
        };
        EntryChange::new(
            clock,
            timestamp,
            self.path,
            self.entry_type,
            self.action,
            rename_properties,
            change_properties,
        )
    }

    fn decode_properties<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .properties
            .clone()
            .ok_or_else(|| Error::store("record is missing its properties blob"))?;
        serde_json::from_value(value).map_err(|e| Error::store(format!("decoding properties: {e}")))
    }
}

/// File-backed, append-only record of observed changes.
///
/// A missing file reads as an empty log: the distinction between "first run"
/// and corruption is carried by the error type, not by guessing.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create a log handle for the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one change record
    pub async fn append(&self, change: &EntryChange) -> Result<()> {
        self.append_all(std::slice::from_ref(change)).await
    }

    /// Append a batch of change records in order
    pub async fn append_all(&self, changes: &[EntryChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut buffer = String::new();
        for change in changes {
            let record = LogRecord::from_change(change)?;
            let line = serde_json::to_string(&record)
                .map_err(|e| Error::store(format!("encoding log record: {e}")))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::store(format!("opening event log '{}': {e}", self.path.display())))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| Error::store(format!("appending to event log: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::store(format!("flushing event log: {e}")))?;

        debug!("appended {} record(s) to {}", changes.len(), self.path.display());
        Ok(())
    }

    /// Read every record, ordered by timestamp ascending (missing
    /// timestamps first). A missing file is an empty log.
    pub async fn load_all(&self, clock: &dyn Clock) -> Result<Vec<EntryChange>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::store(format!(
                    "reading event log '{}': {e}",
                    self.path.display()
                )))
            }
        };

        let mut changes = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let record: LogRecord = serde_json::from_str(line).map_err(|e| {
                Error::store(format!("event log line {}: {e}", line_no + 1))
            })?;
            changes.push(record.into_change(clock)?);
        }
        changes.sort_by(EntryChange::timestamp_order);
        debug!("loaded {} record(s) from {}", changes.len(), self.path.display());
        Ok(changes)
    }

    /// Number of records currently in the log
    pub async fn len(&self) -> Result<usize> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text.lines().filter(|line| !line.is_empty()).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::store(format!(
                "reading event log '{}': {e}",
                self.path.display()
            ))),
        }
    }

    /// Whether the log holds no records
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop all records. Called once a synchronization run has fully
    /// consumed the log.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("cleared event log {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store(format!(
                "clearing event log '{}': {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use twinsync_types::ManualClock;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    fn sample_changes(clock: &ManualClock) -> Vec<EntryChange> {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
        vec![
            EntryChange::create(
                clock,
                Some(now),
                "docs/a.txt",
                EntryType::File,
                Some(ChangeProperties::file(now, 42)),
            )
            .unwrap(),
            EntryChange::rename(
                clock,
                Some(now + chrono::Duration::seconds(5)),
                "docs/a.txt",
                EntryType::File,
                "b.txt",
            )
            .unwrap(),
            EntryChange::delete(
                clock,
                Some(now + chrono::Duration::seconds(10)),
                "docs/old",
                EntryType::Directory,
            )
            .unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_append_and_load_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.log"));
        let clock = clock();
        let changes = sample_changes(&clock);

        log.append_all(&changes).await.unwrap();
        let loaded = log.load_all(&clock).await.unwrap();
        assert_eq!(loaded, changes);
    }

    #[tokio::test]
    async fn test_load_orders_by_timestamp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.log"));
        let clock = clock();
        let changes = sample_changes(&clock);

        // Append out of order; load must come back sorted.
        log.append(&changes[2]).await.unwrap();
        log.append(&changes[0]).await.unwrap();
        log.append(&changes[1]).await.unwrap();

        let loaded = log.load_all(&clock).await.unwrap();
        assert_eq!(loaded, changes);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_log() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("never-written.log"));
        let clock = clock();

        assert!(log.load_all(&clock).await.unwrap().is_empty());
        assert_eq!(log.len().await.unwrap(), 0);
        log.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_consumes_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = EventLog::new(tmp.path().join("events.log"));
        let clock = clock();

        log.append_all(&sample_changes(&clock)).await.unwrap();
        assert_eq!(log.len().await.unwrap(), 3);

        log.clear().await.unwrap();
        assert!(log.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_line_is_a_store_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("events.log");
        tokio::fs::write(&path, b"not json\n").await.unwrap();

        let log = EventLog::new(&path);
        let result = log.load_all(&clock()).await;
        assert!(matches!(result, Err(Error::Store { .. })));
    }
}
