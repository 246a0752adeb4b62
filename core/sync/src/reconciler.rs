//! Reconciliation of the replica tree against the source tree.
//!
//! A pass has two phases:
//! 1. Create/update: walk the source top-down, create missing replica
//!    directories and copy every file whose replica counterpart is absent or
//!    differs in content.
//! 2. Remove: walk the replica children-first and delete every entry with no
//!    counterpart in the source. A directory goes only once it is empty.
//!
//! Nothing is remembered between passes; every pass recomputes the full diff.
//! A failure on one entry is recorded and the pass moves on to the next.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use foldersync_common::{Error, RelativePath, Result};

use crate::activity::{ActivitySink, Operation, SyncEvent};
use crate::fingerprint::{ChangeDecision, Fingerprint};
use crate::staging::copy_atomic;
use crate::walker::{EntryKind, TreeWalker};

/// Outcome counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Files copied into the replica (new or updated).
    pub copied: usize,
    /// Replica directories newly created.
    pub directories_created: usize,
    /// Replica files and directories removed.
    pub deleted: usize,
    /// Files found identical and left alone.
    pub unchanged: usize,
    /// Entries that could not be processed.
    pub failed: usize,
    /// Whether the pass stopped early on shutdown.
    pub interrupted: bool,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl PassReport {
    /// Number of changes made to the replica.
    pub fn actions(&self) -> usize {
        self.copied + self.directories_created + self.deleted
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} directories created, {} deleted, {} unchanged, {} failed in {:.2?}",
            self.copied,
            self.directories_created,
            self.deleted,
            self.unchanged,
            self.failed,
            self.duration
        )
    }
}

type StepResult<T = ()> = std::result::Result<T, (Operation, Error)>;

fn during<E: Into<Error>>(operation: Operation) -> impl FnOnce(E) -> (Operation, Error) {
    move |e| (operation, e.into())
}

/// Makes a replica tree mirror a source tree.
pub struct Reconciler {
    source: PathBuf,
    replica: PathBuf,
    activity: Arc<dyn ActivitySink>,
}

impl Reconciler {
    /// Create a reconciler between two roots, reporting to `activity`.
    pub fn new(
        source: impl Into<PathBuf>,
        replica: impl Into<PathBuf>,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            activity,
        }
    }

    /// Root of the source tree.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Root of the replica tree.
    pub fn replica(&self) -> &Path {
        &self.replica
    }

    /// Make sure the replica root exists, creating it if needed.
    ///
    /// Returns the event describing what was found.
    pub fn ensure_replica_root(&self) -> Result<SyncEvent> {
        match EntryKind::probe(&self.replica)? {
            Some(EntryKind::Directory) => Ok(SyncEvent::ReplicaExists(self.replica.clone())),
            Some(kind) => Err(Error::InvalidInput(format!(
                "Replica {} exists but is not a directory ({:?})",
                self.replica.display(),
                kind
            ))),
            None => {
                fs::create_dir_all(&self.replica)?;
                Ok(SyncEvent::ReplicaCreated(self.replica.clone()))
            }
        }
    }

    /// Run one full pass.
    ///
    /// `cancel` is checked between entries; a cancelled pass stops at the next
    /// entry boundary and reports itself as interrupted. The replica is
    /// consistent at every such boundary.
    pub fn run_pass(&self, cancel: &CancellationToken) -> PassReport {
        let start = Instant::now();
        let mut report = PassReport::default();

        info!(
            "Starting sync pass: {} -> {}",
            self.source.display(),
            self.replica.display()
        );

        if self.prepare(&mut report) {
            self.sync_source_tree(&mut report, cancel);
            if !report.interrupted {
                self.remove_extraneous(&mut report, cancel);
            }
        }

        report.duration = start.elapsed();
        info!("Sync pass finished: {}", report);
        report
    }

    /// Check both roots before touching anything. Returns false to skip the pass.
    fn prepare(&self, report: &mut PassReport) -> bool {
        match EntryKind::probe(&self.replica) {
            Ok(Some(EntryKind::Directory)) => {}
            Ok(None) => match self.ensure_replica_root() {
                Ok(event) => self.activity.record(&event),
                Err(e) => {
                    self.fail(report, Operation::CreateDirectory, None, e);
                    return false;
                }
            },
            Ok(Some(kind)) => {
                let e = Error::InvalidInput(format!("replica root is a {:?}", kind));
                self.fail(report, Operation::Inspect, None, e);
                return false;
            }
            Err(e) => {
                self.fail(report, Operation::Inspect, None, e.into());
                return false;
            }
        }

        match EntryKind::probe(&self.source) {
            Ok(Some(EntryKind::Directory)) => true,
            Ok(None) => {
                warn!("Source {} does not exist", self.source.display());
                self.activity
                    .record(&SyncEvent::SourceMissing(self.source.clone()));
                true
            }
            Ok(Some(kind)) => {
                let e = Error::InvalidInput(format!("source root is a {:?}", kind));
                self.fail(report, Operation::Inspect, None, e);
                false
            }
            Err(e) => {
                self.fail(report, Operation::Inspect, None, e.into());
                false
            }
        }
    }

    /// Phase 1: create directories and copy new or changed files.
    fn sync_source_tree(&self, report: &mut PassReport, cancel: &CancellationToken) {
        for item in TreeWalker::new(&self.source).top_down() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                return;
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    self.fail(report, Operation::Walk, None, e);
                    continue;
                }
            };

            let result = match entry.kind {
                EntryKind::Directory => self.sync_directory(&entry.path, report),
                EntryKind::File => self.sync_file(&entry.path, report),
                EntryKind::Symlink | EntryKind::Special => {
                    debug!("Skipping {:?} entry {}", entry.kind, entry.path);
                    Ok(())
                }
            };

            if let Err((operation, e)) = result {
                self.fail(report, operation, Some(entry.path), e);
            }
        }
    }

    fn sync_directory(&self, path: &RelativePath, report: &mut PassReport) -> StepResult {
        let target = path.resolve(&self.replica);

        match EntryKind::probe(&target).map_err(during(Operation::Inspect))? {
            Some(EntryKind::Directory) => return Ok(()),
            Some(_) => {
                fs::remove_file(&target).map_err(during(Operation::Delete))?;
                report.deleted += 1;
                self.activity.record(&SyncEvent::FileDeleted(path.clone()));
            }
            None => {}
        }

        match fs::create_dir(&target) {
            Ok(()) => {
                report.directories_created += 1;
                self.activity
                    .record(&SyncEvent::DirectoryCreated(path.clone()));
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && target.is_dir() => Ok(()),
            Err(e) => Err((Operation::CreateDirectory, e.into())),
        }
    }

    fn sync_file(&self, path: &RelativePath, report: &mut PassReport) -> StepResult {
        let source = path.resolve(&self.source);
        let target = path.resolve(&self.replica);

        let replica_kind = EntryKind::probe(&target).map_err(during(Operation::Inspect))?;
        let replica_fingerprint = match replica_kind {
            None => Fingerprint::Absent,
            Some(EntryKind::File) => Fingerprint::of_file(&target),
            Some(EntryKind::Directory) => {
                fs::remove_dir_all(&target).map_err(during(Operation::Delete))?;
                report.deleted += 1;
                self.activity
                    .record(&SyncEvent::DirectoryDeleted(path.clone()));
                Fingerprint::Absent
            }
            // Links and special files are replaced, never read through.
            Some(_) => Fingerprint::Unreadable,
        };

        let decision = match replica_fingerprint {
            Fingerprint::Absent => ChangeDecision::Create,
            replica => {
                let current = Fingerprint::of_file(&source);
                if let (Fingerprint::Digest(new), Fingerprint::Digest(old)) = (current, replica) {
                    if new != old {
                        debug!("Content of {} changed: {} -> {}", path, old, new);
                    }
                }
                ChangeDecision::decide(&current, &replica)
            }
        };

        if decision == ChangeDecision::NoChange {
            report.unchanged += 1;
            return Ok(());
        }

        copy_atomic(&source, &target).map_err(during(Operation::Copy))?;
        report.copied += 1;
        self.activity.record(&SyncEvent::FileCopied {
            path: path.clone(),
            decision,
        });
        Ok(())
    }

    /// Phase 2: delete replica entries the source no longer has.
    fn remove_extraneous(&self, report: &mut PassReport, cancel: &CancellationToken) {
        for item in TreeWalker::new(&self.replica).post_order() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                return;
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    self.fail(report, Operation::Walk, None, e);
                    continue;
                }
            };

            let counterpart = match self.source_kind(&entry.path) {
                Ok(kind) => kind,
                Err(e) => {
                    self.fail(report, Operation::Inspect, Some(entry.path), e.into());
                    continue;
                }
            };

            let is_dir = entry.kind == EntryKind::Directory;
            if counterpart.is_some_and(|kind| (kind == EntryKind::Directory) == is_dir) {
                continue;
            }

            let result = if is_dir {
                self.remove_directory(&entry.path, report)
            } else {
                self.remove_file(&entry.path, report)
            };

            if let Err((operation, e)) = result {
                self.fail(report, operation, Some(entry.path), e);
            }
        }
    }

    fn remove_file(&self, path: &RelativePath, report: &mut PassReport) -> StepResult {
        fs::remove_file(path.resolve(&self.replica)).map_err(during(Operation::Delete))?;
        report.deleted += 1;
        self.activity.record(&SyncEvent::FileDeleted(path.clone()));
        Ok(())
    }

    /// Remove a replica directory iff nothing is left in it.
    ///
    /// Children were visited first, so a directory with no source counterpart
    /// is only non-empty here if removing one of its children failed.
    fn remove_directory(&self, path: &RelativePath, report: &mut PassReport) -> StepResult {
        let target = path.resolve(&self.replica);
        let is_empty = fs::read_dir(&target)
            .map_err(during(Operation::Inspect))?
            .next()
            .is_none();

        if !is_empty {
            debug!("Keeping non-empty directory {}", path);
            return Ok(());
        }

        fs::remove_dir(&target).map_err(during(Operation::Delete))?;
        report.deleted += 1;
        self.activity
            .record(&SyncEvent::DirectoryDeleted(path.clone()));
        Ok(())
    }

    /// What the source holds at `path` that phase 1 would mirror, if anything.
    ///
    /// Links and special files are skipped by phase 1 and count as nothing,
    /// as does any path below a non-directory (a link to a directory
    /// included) in the source.
    fn source_kind(&self, path: &RelativePath) -> io::Result<Option<EntryKind>> {
        let probed = EntryKind::probe(&path.resolve(&self.source));
        if matches!(probed, Ok(None)) || self.shadowed_in_source(path) {
            return Ok(None);
        }

        match probed? {
            Some(EntryKind::Symlink | EntryKind::Special) => Ok(None),
            kind => Ok(kind),
        }
    }

    /// Whether some ancestor of `path` is not a real directory in the source.
    fn shadowed_in_source(&self, path: &RelativePath) -> bool {
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir.is_root() {
                break;
            }
            if let Ok(kind) = EntryKind::probe(&dir.resolve(&self.source)) {
                if kind != Some(EntryKind::Directory) {
                    return true;
                }
            }
            ancestor = dir.parent();
        }
        false
    }

    fn fail(
        &self,
        report: &mut PassReport,
        operation: Operation,
        path: Option<RelativePath>,
        error: Error,
    ) {
        match &path {
            Some(path) => warn!("Failed to {} {}: {}", operation, path, error),
            None => warn!("Failed to {}: {}", operation, error),
        }
        report.failed += 1;
        self.activity.record(&SyncEvent::OperationFailed {
            operation,
            path,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::MemoryLog;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        replica: PathBuf,
        log: Arc<MemoryLog>,
        reconciler: Reconciler,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let source = temp.path().join("source");
            let replica = temp.path().join("replica");
            fs::create_dir(&source).unwrap();
            fs::create_dir(&replica).unwrap();

            let log = Arc::new(MemoryLog::new());
            let reconciler = Reconciler::new(&source, &replica, log.clone());

            Self {
                _temp: temp,
                source,
                replica,
                log,
                reconciler,
            }
        }

        fn pass(&self) -> PassReport {
            self.reconciler.run_pass(&CancellationToken::new())
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn rel(path: &str) -> RelativePath {
        RelativePath::parse(path).unwrap()
    }

    /// Relative path -> file content (None for directories).
    fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        TreeWalker::new(root)
            .top_down()
            .map(|entry| {
                let entry = entry.unwrap();
                let content = match entry.kind {
                    EntryKind::Directory => None,
                    _ => Some(fs::read(entry.path.resolve(root)).unwrap()),
                };
                (entry.path.to_string_path(), content)
            })
            .collect()
    }

    #[test]
    fn test_copies_new_file() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "X");

        let report = fx.pass();

        assert_eq!(fs::read_to_string(fx.replica.join("a.txt")).unwrap(), "X");
        assert_eq!(report.copied, 1);
        assert_eq!(
            fx.log.events(),
            vec![SyncEvent::FileCopied {
                path: rel("a.txt"),
                decision: ChangeDecision::Create,
            }]
        );
        assert!(fx.log.messages()[0].contains("Copied"));
    }

    #[test]
    fn test_updates_changed_file() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "X");
        write(&fx.replica, "a.txt", "Y");

        let report = fx.pass();

        assert_eq!(fs::read_to_string(fx.replica.join("a.txt")).unwrap(), "X");
        assert_eq!(report.copied, 1);
        assert_eq!(report.actions(), 1);
        assert_eq!(
            fx.log.events(),
            vec![SyncEvent::FileCopied {
                path: rel("a.txt"),
                decision: ChangeDecision::Update,
            }]
        );
    }

    #[test]
    fn test_removes_orphaned_subtree() {
        let fx = Fixture::new();
        write(&fx.replica, "old/deep/file.txt", "stale");

        let report = fx.pass();

        assert!(!fx.replica.join("old").exists());
        assert!(fx.replica.exists());
        assert_eq!(report.deleted, 3);
        assert_eq!(
            fx.log.events(),
            vec![
                SyncEvent::FileDeleted(rel("old/deep/file.txt")),
                SyncEvent::DirectoryDeleted(rel("old/deep")),
                SyncEvent::DirectoryDeleted(rel("old")),
            ]
        );
    }

    #[test]
    fn test_identical_file_is_left_alone() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "same");
        write(&fx.replica, "a.txt", "same");

        let report = fx.pass();

        assert_eq!(report.actions(), 0);
        assert_eq!(report.unchanged, 1);
        assert!(fx.log.events().is_empty());
    }

    #[test]
    fn test_second_pass_is_idle() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "a");
        write(&fx.source, "dir/b.txt", "b");
        write(&fx.source, "dir/sub/c.txt", "c");
        fs::create_dir_all(fx.source.join("empty/dir")).unwrap();
        write(&fx.replica, "stale.txt", "old");

        let first = fx.pass();
        assert_eq!(first.copied, 3);
        assert_eq!(first.directories_created, 4);
        assert_eq!(first.deleted, 1);

        fx.log.clear();
        let second = fx.pass();
        assert_eq!(second.actions(), 0);
        assert_eq!(second.unchanged, 3);
        assert!(fx.log.events().is_empty());
        assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));
    }

    #[test]
    fn test_existing_directories_are_not_logged() {
        let fx = Fixture::new();
        write(&fx.source, "dir/a.txt", "a");
        fs::create_dir(fx.replica.join("dir")).unwrap();

        fx.pass();

        assert_eq!(
            fx.log.events(),
            vec![SyncEvent::FileCopied {
                path: rel("dir/a.txt"),
                decision: ChangeDecision::Create,
            }]
        );
    }

    #[test]
    fn test_partial_deletion_keeps_mapped_siblings() {
        let fx = Fixture::new();
        write(&fx.source, "dir/keep.txt", "keep");
        write(&fx.replica, "dir/keep.txt", "keep");
        write(&fx.replica, "dir/drop.txt", "drop");
        write(&fx.replica, "dir/gone/inner.txt", "gone");

        let report = fx.pass();

        assert_eq!(report.deleted, 3);
        assert_eq!(fs::read_to_string(fx.replica.join("dir/keep.txt")).unwrap(), "keep");
        assert!(!fx.replica.join("dir/drop.txt").exists());
        assert!(!fx.replica.join("dir/gone").exists());
        assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));
    }

    #[test]
    fn test_empty_source_directory_is_kept_in_replica() {
        let fx = Fixture::new();
        fs::create_dir(fx.source.join("empty")).unwrap();

        fx.pass();
        let second = fx.pass();

        assert!(fx.replica.join("empty").is_dir());
        assert_eq!(second.actions(), 0);
    }

    #[test]
    fn test_replica_file_replaced_by_source_directory() {
        let fx = Fixture::new();
        write(&fx.source, "x/inner.txt", "inner");
        write(&fx.replica, "x", "was a file");

        let report = fx.pass();

        assert!(report.failed == 0, "{:?}", fx.log.messages());
        assert_eq!(fs::read_to_string(fx.replica.join("x/inner.txt")).unwrap(), "inner");
        assert_eq!(
            fx.log.events(),
            vec![
                SyncEvent::FileDeleted(rel("x")),
                SyncEvent::DirectoryCreated(rel("x")),
                SyncEvent::FileCopied {
                    path: rel("x/inner.txt"),
                    decision: ChangeDecision::Create,
                },
            ]
        );
    }

    #[test]
    fn test_replica_directory_replaced_by_source_file() {
        let fx = Fixture::new();
        write(&fx.source, "x", "now a file");
        write(&fx.replica, "x/inner.txt", "inner");

        let report = fx.pass();

        assert_eq!(report.failed, 0);
        assert_eq!(fs::read_to_string(fx.replica.join("x")).unwrap(), "now a file");
        assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));
    }

    #[test]
    fn test_missing_source_is_treated_as_empty() {
        let fx = Fixture::new();
        fs::remove_dir(&fx.source).unwrap();
        write(&fx.replica, "a.txt", "a");

        let report = fx.pass();

        assert_eq!(report.deleted, 1);
        assert!(fx.replica.is_dir());
        assert_eq!(
            fx.log.events(),
            vec![
                SyncEvent::SourceMissing(fx.source.clone()),
                SyncEvent::FileDeleted(rel("a.txt")),
            ]
        );
    }

    #[test]
    fn test_source_root_that_is_a_file_skips_the_pass() {
        let fx = Fixture::new();
        fs::remove_dir(&fx.source).unwrap();
        fs::write(&fx.source, "not a directory").unwrap();
        write(&fx.replica, "a.txt", "a");

        let report = fx.pass();

        assert_eq!(report.failed, 1);
        assert_eq!(report.actions(), 0);
        assert!(fx.replica.join("a.txt").exists());
    }

    #[test]
    fn test_missing_replica_root_is_recreated() {
        let fx = Fixture::new();
        fs::remove_dir(&fx.replica).unwrap();
        write(&fx.source, "a.txt", "a");

        fx.pass();

        assert_eq!(fs::read_to_string(fx.replica.join("a.txt")).unwrap(), "a");
        assert_eq!(
            fx.log.events()[0],
            SyncEvent::ReplicaCreated(fx.replica.clone())
        );
    }

    #[test]
    fn test_ensure_replica_root() {
        let fx = Fixture::new();
        assert_eq!(
            fx.reconciler.ensure_replica_root().unwrap(),
            SyncEvent::ReplicaExists(fx.replica.clone())
        );

        fs::remove_dir(&fx.replica).unwrap();
        assert_eq!(
            fx.reconciler.ensure_replica_root().unwrap(),
            SyncEvent::ReplicaCreated(fx.replica.clone())
        );
        assert!(fx.replica.is_dir());
    }

    #[test]
    fn test_cancelled_pass_changes_nothing() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "a");
        write(&fx.replica, "stale.txt", "stale");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fx.reconciler.run_pass(&cancel);

        assert!(report.interrupted);
        assert_eq!(report.actions(), 0);
        assert!(!fx.replica.join("a.txt").exists());
        assert!(fx.replica.join("stale.txt").exists());
    }

    #[test]
    fn test_leftover_staging_files_are_removed() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "a");
        write(&fx.replica, ".a.txt.5f0c6e0e-0000-4000-8000-000000000000.tmp", "partial");

        fx.pass();

        assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        write(&fx.source, "locked.txt", "secret");
        write(&fx.source, "open.txt", "public");
        let locked = fx.source.join("locked.txt");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read regardless of mode bits.
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let report = fx.pass();

        assert_eq!(report.failed, 1);
        assert_eq!(report.copied, 1);
        assert_eq!(fs::read_to_string(fx.replica.join("open.txt")).unwrap(), "public");
        assert!(!fx.replica.join("locked.txt").exists());
        assert!(fx
            .log
            .messages()
            .iter()
            .any(|m| m.starts_with("Failed to copy 'locked.txt'")));
        // Nothing half-written is left behind.
        assert_eq!(fs::read_dir(&fx.replica).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_source_symlinks_are_skipped() {
        let fx = Fixture::new();
        write(&fx.source, "real.txt", "real");
        std::os::unix::fs::symlink(fx.source.join("real.txt"), fx.source.join("link.txt")).unwrap();

        let report = fx.pass();

        assert_eq!(report.copied, 1);
        assert!(!fx.replica.join("link.txt").exists());
        assert_eq!(fx.pass().actions(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_replica_symlink_is_replaced_by_file() {
        let fx = Fixture::new();
        write(&fx.source, "a.txt", "same");
        write(&fx.replica, "target.txt", "same");
        write(&fx.source, "target.txt", "same");
        std::os::unix::fs::symlink(fx.replica.join("target.txt"), fx.replica.join("a.txt")).unwrap();

        fx.pass();

        let meta = fs::symlink_metadata(fx.replica.join("a.txt")).unwrap();
        assert!(meta.file_type().is_file());
        assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));
    }

    #[cfg(unix)]
    #[test]
    fn test_replica_file_under_source_symlink_is_removed() {
        let fx = Fixture::new();
        write(&fx.source, "real.txt", "real");
        write(&fx.replica, "link.txt", "old regular file");
        std::os::unix::fs::symlink(fx.source.join("real.txt"), fx.source.join("link.txt")).unwrap();

        let report = fx.pass();

        assert_eq!(report.failed, 0);
        assert!(fs::symlink_metadata(fx.replica.join("link.txt")).is_err());
        assert!(fx.log.events().contains(&SyncEvent::FileDeleted(rel("link.txt"))));
        assert_eq!(fx.pass().actions(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_replica_directory_under_source_directory_symlink_is_removed() {
        let fx = Fixture::new();
        write(&fx.source, "real/child.txt", "child");
        write(&fx.replica, "linked/child.txt", "child");
        std::os::unix::fs::symlink(fx.source.join("real"), fx.source.join("linked")).unwrap();

        let report = fx.pass();

        assert_eq!(report.failed, 0);
        assert!(!fx.replica.join("linked").exists());
        assert_eq!(fs::read_to_string(fx.replica.join("real/child.txt")).unwrap(), "child");
        assert_eq!(fx.pass().actions(), 0);
    }

    #[test]
    fn test_longest_file_name_converges() {
        let fx = Fixture::new();
        let name = format!("{}.txt", "a".repeat(246));
        write(&fx.source, &name, "long");

        let report = fx.pass();

        assert_eq!(report.failed, 0);
        assert_eq!(report.copied, 1);
        assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));
        assert_eq!(fx.pass().actions(), 0);
    }

    fn tree_strategy() -> impl Strategy<Value = Vec<(Vec<String>, String)>> {
        let name = prop::sample::select(vec!["a", "b", "c"]).prop_map(String::from);
        let path = prop::collection::vec(name, 1..4);
        prop::collection::vec((path, "[xyz]{0,3}"), 0..8)
    }

    /// Write entries in order, skipping any that collide with an earlier one.
    fn materialize(root: &Path, entries: &[(Vec<String>, String)]) {
        for (components, content) in entries {
            let path = components.iter().fold(root.to_path_buf(), |p, c| p.join(c));
            if let Some(parent) = path.parent() {
                if fs::create_dir_all(parent).is_err() {
                    continue;
                }
            }
            let _ = fs::write(&path, content);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_one_pass_converges_and_second_is_idle(
            source in tree_strategy(),
            replica in tree_strategy(),
        ) {
            let fx = Fixture::new();
            materialize(&fx.source, &source);
            materialize(&fx.replica, &replica);

            let first = fx.pass();
            prop_assert_eq!(first.failed, 0);
            prop_assert_eq!(snapshot(&fx.source), snapshot(&fx.replica));

            let second = fx.pass();
            prop_assert_eq!(second.actions(), 0);
            prop_assert_eq!(second.failed, 0);
        }
    }
}
