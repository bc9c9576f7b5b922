//! End-to-end synchronization scenarios over real temporary trees

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use twinsync_config::ServiceLayout;
use twinsync_engine::{PreferNewer, SyncOptions, Synchronizer};
use twinsync_source::{SourceManager, WatchEvent, WatchEventKind};
use twinsync_store::EventLog;
use twinsync_types::path::PathMatcher;
use twinsync_types::{EntryType, ManualClock};

const SERVICE_DIR: &str = ".twinsync";

#[derive(Debug)]
struct AllowAll;
impl PathMatcher for AllowAll {
    fn is_match(&self, _path: &str) -> bool {
        false
    }
}

fn test_clock() -> Arc<ManualClock> {
    // Ahead of the wall clock so every disk mtime passes the
    // future-timestamp validation against this clock.
    Arc::new(ManualClock::new(
        chrono::Utc::now() + chrono::Duration::seconds(300),
    ))
}

fn synchronizer(source: &Path, target: &Path, clock: Arc<ManualClock>) -> Synchronizer {
    Synchronizer::new(
        ServiceLayout::new(source, SERVICE_DIR),
        ServiceLayout::new(target, SERVICE_DIR),
        clock,
        Arc::new(AllowAll),
        Arc::new(PreferNewer),
        SyncOptions::default(),
    )
}

fn manager(root: &Path, clock: Arc<ManualClock>) -> SourceManager {
    let log = EventLog::new(root.join(SERVICE_DIR).join("events.log"));
    SourceManager::start(root, log, clock, Arc::new(AllowAll)).unwrap()
}

/// Walk a tree into relative path -> (is_dir, content) for comparisons,
/// skipping the service folder.
fn snapshot(root: &Path) -> BTreeMap<String, (bool, Vec<u8>)> {
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, (bool, Vec<u8>)>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        if relative.starts_with(SERVICE_DIR) {
            continue;
        }
        if path.is_dir() {
            out.insert(relative, (true, Vec::new()));
            walk(root, &path, out);
        } else {
            out.insert(relative, (false, std::fs::read(&path).unwrap()));
        }
    }
}

fn read_index(root: &Path) -> Vec<u8> {
    std::fs::read(root.join(SERVICE_DIR).join("index")).unwrap()
}

async fn event(manager: &mut SourceManager, path: &str, entry_type: EntryType, kind: WatchEventKind) {
    manager
        .handle_event(WatchEvent::new(path, entry_type, kind))
        .await
        .unwrap();
}

#[tokio::test]
async fn all_actions_scenario_converges_byte_identically() {
    let source = tempfile::TempDir::new().unwrap();
    let target = tempfile::TempDir::new().unwrap();
    let clock = test_clock();

    // Known starting tree on the source only.
    std::fs::create_dir_all(source.path().join("docs/inner")).unwrap();
    std::fs::create_dir_all(source.path().join("legacy")).unwrap();
    std::fs::create_dir_all(source.path().join("tmp")).unwrap();
    std::fs::write(source.path().join("docs/readme.md"), b"readme v1").unwrap();
    std::fs::write(source.path().join("docs/inner/notes.txt"), b"notes").unwrap();
    std::fs::write(source.path().join("docs/inner/draft.txt"), b"draft").unwrap();
    std::fs::write(source.path().join("legacy/old.txt"), b"old data").unwrap();
    std::fs::write(source.path().join("tmp/scratch.txt"), b"scratch").unwrap();
    std::fs::write(source.path().join("hello.txt"), b"hello").unwrap();

    let sync = synchronizer(source.path(), target.path(), clock.clone());
    let baseline = sync.run().await.unwrap();
    assert!(baseline.first_run);
    assert!(baseline.failed.is_empty());
    assert_eq!(snapshot(source.path()), snapshot(target.path()));

    // Eight scripted changes, source side only, observed through the
    // source manager so the event log records them.
    let mut mgr = manager(source.path(), clock.clone());

    // 1. nested directory create
    std::fs::create_dir(source.path().join("docs/assets")).unwrap();
    std::fs::write(source.path().join("docs/assets/logo.bin"), b"LOGO").unwrap();
    event(&mut mgr, "docs/assets", EntryType::Directory, WatchEventKind::Created).await;

    // 2. directory rename
    std::fs::rename(source.path().join("legacy"), source.path().join("archive")).unwrap();
    event(
        &mut mgr,
        "legacy",
        EntryType::Directory,
        WatchEventKind::Renamed {
            new_name: "archive".to_string(),
        },
    )
    .await;

    // 3. directory delete
    std::fs::remove_dir_all(source.path().join("tmp")).unwrap();
    event(&mut mgr, "tmp", EntryType::Directory, WatchEventKind::Removed).await;

    // 4. file create
    std::fs::write(source.path().join("new.txt"), b"fresh").unwrap();
    event(&mut mgr, "new.txt", EntryType::File, WatchEventKind::Created).await;

    // 5. file rename
    std::fs::rename(source.path().join("hello.txt"), source.path().join("hi.txt")).unwrap();
    event(
        &mut mgr,
        "hello.txt",
        EntryType::File,
        WatchEventKind::Renamed {
            new_name: "hi.txt".to_string(),
        },
    )
    .await;

    // 6. nested file rename
    std::fs::rename(
        source.path().join("docs/inner/draft.txt"),
        source.path().join("docs/inner/final.txt"),
    )
    .unwrap();
    event(
        &mut mgr,
        "docs/inner/draft.txt",
        EntryType::File,
        WatchEventKind::Renamed {
            new_name: "final.txt".to_string(),
        },
    )
    .await;

    // 7. nested file change
    std::fs::write(
        source.path().join("docs/inner/notes.txt"),
        b"notes v2 extended",
    )
    .unwrap();
    event(
        &mut mgr,
        "docs/inner/notes.txt",
        EntryType::File,
        WatchEventKind::Changed,
    )
    .await;

    // 8. nested file delete
    std::fs::remove_file(source.path().join("docs/readme.md")).unwrap();
    event(&mut mgr, "docs/readme.md", EntryType::File, WatchEventKind::Removed).await;

    let report = sync.run().await.unwrap();
    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert!(!report.first_run);

    // Both physical trees are identical, and no entry is unique to either
    // side.
    let source_tree = snapshot(source.path());
    let target_tree = snapshot(target.path());
    assert_eq!(source_tree, target_tree);

    // The expected end state, spelled out.
    assert!(source_tree.contains_key("docs/assets/logo.bin"));
    assert!(source_tree.contains_key("archive/old.txt"));
    assert!(!source_tree.contains_key("legacy"));
    assert!(!source_tree.contains_key("tmp"));
    assert!(source_tree.contains_key("new.txt"));
    assert!(source_tree.contains_key("hi.txt"));
    assert!(!source_tree.contains_key("hello.txt"));
    assert!(source_tree.contains_key("docs/inner/final.txt"));
    assert!(!source_tree.contains_key("docs/inner/draft.txt"));
    assert_eq!(
        target_tree.get("docs/inner/notes.txt").unwrap().1,
        b"notes v2 extended"
    );
    assert!(!source_tree.contains_key("docs/readme.md"));

    // Both index files hold byte-identical serialized state.
    assert_eq!(read_index(source.path()), read_index(target.path()));

    // The consumed event log is gone.
    assert_eq!(mgr.pending_events().await.unwrap(), 0);
}

#[tokio::test]
async fn directory_create_vs_create_merges_without_loss() {
    let source = tempfile::TempDir::new().unwrap();
    let target = tempfile::TempDir::new().unwrap();
    let clock = test_clock();

    let sync = synchronizer(source.path(), target.path(), clock.clone());
    sync.run().await.unwrap();

    // Source side grows shared/s.txt through watched events.
    let mut mgr = manager(source.path(), clock.clone());
    std::fs::create_dir(source.path().join("shared")).unwrap();
    std::fs::write(source.path().join("shared/s.txt"), b"from source").unwrap();
    event(&mut mgr, "shared", EntryType::Directory, WatchEventKind::Created).await;

    // Target side grows shared/t.txt behind the synchronizer's back.
    std::fs::create_dir(target.path().join("shared")).unwrap();
    std::fs::write(target.path().join("shared/t.txt"), b"from target").unwrap();

    let report = sync.run().await.unwrap();
    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert!(report.stats.conflicts >= 1);

    // The directories merged: both files on both sides, nothing dropped.
    let source_tree = snapshot(source.path());
    assert_eq!(source_tree, snapshot(target.path()));
    assert_eq!(source_tree.get("shared/s.txt").unwrap().1, b"from source");
    assert_eq!(source_tree.get("shared/t.txt").unwrap().1, b"from target");
}

#[tokio::test]
async fn file_create_vs_create_resolves_to_exactly_one() {
    let source = tempfile::TempDir::new().unwrap();
    let target = tempfile::TempDir::new().unwrap();
    let clock = test_clock();

    let sync = synchronizer(source.path(), target.path(), clock.clone());
    sync.run().await.unwrap();

    let mut mgr = manager(source.path(), clock.clone());
    std::fs::write(source.path().join("dup.txt"), b"source wording").unwrap();
    event(&mut mgr, "dup.txt", EntryType::File, WatchEventKind::Created).await;
    std::fs::write(target.path().join("dup.txt"), b"target").unwrap();

    let report = sync.run().await.unwrap();
    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert_eq!(report.stats.conflicts, 1);

    // Exactly one version survives, on both sides.
    let source_tree = snapshot(source.path());
    let target_tree = snapshot(target.path());
    assert_eq!(source_tree, target_tree);
    let survivor = &source_tree.get("dup.txt").unwrap().1;
    assert!(survivor == b"source wording" || survivor == b"target");
}

#[tokio::test]
async fn successive_runs_leave_no_orphans() {
    let source = tempfile::TempDir::new().unwrap();
    let target = tempfile::TempDir::new().unwrap();
    let clock = test_clock();

    std::fs::create_dir_all(source.path().join("a/b")).unwrap();
    std::fs::write(source.path().join("a/b/deep.txt"), b"deep").unwrap();
    std::fs::write(target.path().join("t.txt"), b"target file").unwrap();

    let sync = synchronizer(source.path(), target.path(), clock.clone());
    let first = sync.run().await.unwrap();
    assert!(first.failed.is_empty());
    assert_eq!(snapshot(source.path()), snapshot(target.path()));

    // A quiet follow-up run changes nothing.
    let second = sync.run().await.unwrap();
    assert_eq!(second.stats.total_applied(), 0);
    assert_eq!(snapshot(source.path()), snapshot(target.path()));
}
