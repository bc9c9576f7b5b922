//! Service folder layout
//!
//! Every tracked root carries one service-metadata folder holding the
//! serialized index, the durable event log, and the sync history. The
//! layout is fixed; only the folder name is configurable.

use std::path::{Path, PathBuf};

/// File name of the serialized index inside the service folder
pub const INDEX_FILE: &str = "index";
/// File name of the event log inside the service folder
pub const EVENT_LOG_FILE: &str = "events.log";
/// File name of the sync history inside the service folder
pub const HISTORY_FILE: &str = "history";

/// Paths of one root's service files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    root: PathBuf,
    service_dir: PathBuf,
}

impl ServiceLayout {
    /// Layout for `root` with the given service folder name
    pub fn new(root: &Path, dir_name: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            service_dir: root.join(dir_name),
        }
    }

    /// The tracked root itself
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The service-metadata folder
    pub fn service_dir(&self) -> &Path {
        &self.service_dir
    }

    /// Location of the serialized index
    pub fn index_path(&self) -> PathBuf {
        self.service_dir.join(INDEX_FILE)
    }

    /// Location of the event log
    pub fn event_log_path(&self) -> PathBuf {
        self.service_dir.join(EVENT_LOG_FILE)
    }

    /// Location of the sync history
    pub fn history_path(&self) -> PathBuf {
        self.service_dir.join(HISTORY_FILE)
    }

    /// Create the service folder if it does not exist
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.service_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ServiceLayout::new(Path::new("/data/a"), ".twinsync");
        assert_eq!(layout.service_dir(), Path::new("/data/a/.twinsync"));
        assert_eq!(layout.index_path(), PathBuf::from("/data/a/.twinsync/index"));
        assert_eq!(
            layout.event_log_path(),
            PathBuf::from("/data/a/.twinsync/events.log")
        );
        assert_eq!(
            layout.history_path(),
            PathBuf::from("/data/a/.twinsync/history")
        );
    }
}
