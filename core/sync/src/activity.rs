//! Activity log: timestamped, human-readable records of everything a sync
//! run does to the replica.

use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::error;

use foldersync_common::{RelativePath, Result};

use crate::fingerprint::ChangeDecision;
use crate::reconciler::PassReport;

/// Timestamp layout used at the start of every record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Operation that failed on a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Enumerating a tree.
    Walk,
    /// Inspecting a path.
    Inspect,
    /// Creating a replica directory.
    CreateDirectory,
    /// Copying a file into the replica.
    Copy,
    /// Removing a replica entry.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::Walk => "walk",
            Operation::Inspect => "inspect",
            Operation::CreateDirectory => "create directory",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// Everything that ends up in the activity log.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The loop is starting.
    Started {
        source: PathBuf,
        replica: PathBuf,
        interval: Duration,
    },
    /// The replica root was already present at startup.
    ReplicaExists(PathBuf),
    /// The replica root was created at startup.
    ReplicaCreated(PathBuf),
    /// The source root does not exist during a pass.
    SourceMissing(PathBuf),
    /// A replica directory was newly created.
    DirectoryCreated(RelativePath),
    /// A file was copied into the replica.
    FileCopied {
        path: RelativePath,
        decision: ChangeDecision,
    },
    /// A replica file was removed.
    FileDeleted(RelativePath),
    /// A replica directory was removed.
    DirectoryDeleted(RelativePath),
    /// A single entry could not be processed; the pass went on.
    OperationFailed {
        operation: Operation,
        path: Option<RelativePath>,
        error: String,
    },
    /// A pass ran to completion.
    PassCompleted(PassReport),
    /// A pass stopped early because shutdown was requested.
    PassInterrupted(PassReport),
    /// The loop has stopped.
    Stopped,
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Started {
                source,
                replica,
                interval,
            } => write!(
                f,
                "Starting synchronization of '{}' into '{}' every {} seconds",
                source.display(),
                replica.display(),
                interval.as_secs()
            ),
            SyncEvent::ReplicaExists(path) => {
                write!(f, "Replica folder '{}' exists", path.display())
            }
            SyncEvent::ReplicaCreated(path) => {
                write!(f, "Replica folder '{}' created", path.display())
            }
            SyncEvent::SourceMissing(path) => write!(
                f,
                "Source folder '{}' does not exist, treating it as empty",
                path.display()
            ),
            SyncEvent::DirectoryCreated(path) => write!(f, "Created directory '{}'", path),
            SyncEvent::FileCopied { path, decision } => match decision {
                ChangeDecision::Create => write!(f, "Copied new file '{}'", path),
                _ => write!(f, "Copied updated file '{}'", path),
            },
            SyncEvent::FileDeleted(path) => write!(f, "Deleted file '{}'", path),
            SyncEvent::DirectoryDeleted(path) => write!(f, "Deleted directory '{}'", path),
            SyncEvent::OperationFailed {
                operation,
                path: Some(path),
                error,
            } => write!(f, "Failed to {} '{}': {}", operation, path, error),
            SyncEvent::OperationFailed {
                operation,
                path: None,
                error,
            } => write!(f, "Failed to {}: {}", operation, error),
            SyncEvent::PassCompleted(report) => {
                write!(f, "Synchronization pass completed: {}", report)
            }
            SyncEvent::PassInterrupted(report) => {
                write!(f, "Synchronization pass interrupted: {}", report)
            }
            SyncEvent::Stopped => f.write_str("Synchronization stopped by interrupt"),
        }
    }
}

/// Destination for activity records.
///
/// The sync core only emits events; durability is up to the sink.
pub trait ActivitySink: Send + Sync {
    /// Record a single event.
    fn record(&self, event: &SyncEvent);
}

/// Render one log line without the trailing newline.
pub fn format_record(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}", at.format(TIMESTAMP_FORMAT), message)
}

/// Append-only activity log file, echoed to standard output.
pub struct ActivityLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ActivityLog {
    /// Open (or create) the log file for appending.
    ///
    /// Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ActivitySink for ActivityLog {
    fn record(&self, event: &SyncEvent) {
        let line = format_record(Local::now(), &event.to_string());
        println!("{}", line);

        let mut file = self.file();
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            error!("Failed to append to {}: {}", self.path.display(), e);
        }
    }
}

/// In-memory sink, mainly for tests and embedding.
#[derive(Default)]
pub struct MemoryLog {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.lock().clone()
    }

    /// Rendered messages, in recording order.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(ToString::to_string).collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SyncEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ActivitySink for MemoryLog {
    fn record(&self, event: &SyncEvent) {
        self.lock().push(event.clone());
    }
}
