//! foldersync engine
//!
//! One-way mirroring of a source tree onto a replica tree:
//! - Content fingerprints to detect changed files
//! - Stateless reconciliation passes (create/update, then remove)
//! - Staged copies so the replica never holds a partially written file
//! - A periodic loop with cooperative shutdown
//! - A timestamped activity log of every change

pub mod activity;
pub mod config;
pub mod fingerprint;
pub mod reconciler;
pub mod scheduler;
pub mod staging;
pub mod walker;

// Re-export main types
pub use activity::{ActivityLog, ActivitySink, MemoryLog, Operation, SyncEvent};
pub use config::SyncConfig;
pub use fingerprint::{ChangeDecision, ContentDigest, Fingerprint};
pub use reconciler::{PassReport, Reconciler};
pub use scheduler::{LoopState, SyncLoop};
pub use staging::{copy_atomic, StagedCopy};
pub use walker::{EntryKind, TreeEntry, TreeWalker};
