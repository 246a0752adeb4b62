//! Configuration of a synchronization run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use foldersync_common::{Error, Result};

/// Everything a sync run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Authoritative tree, never modified.
    pub source: PathBuf,
    /// Mirror tree, fully owned by the run.
    pub replica: PathBuf,
    /// Pause between the end of one pass and the start of the next.
    pub interval: Duration,
    /// Activity log file.
    pub log_file: PathBuf,
}

impl SyncConfig {
    /// Create a configuration with an interval in whole seconds.
    pub fn new(
        source: impl Into<PathBuf>,
        replica: impl Into<PathBuf>,
        interval_secs: u64,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            interval: Duration::from_secs(interval_secs),
            log_file: log_file.into(),
        }
    }

    /// Check that the two trees can be mirrored without touching each other.
    ///
    /// # Errors
    /// - Source and replica are the same directory
    /// - One of them lies inside the other
    /// - The log file lies inside either tree
    pub fn validate(&self) -> Result<()> {
        let source = absolutize(&self.source)?;
        let replica = absolutize(&self.replica)?;

        if source == replica {
            return Err(Error::InvalidInput(format!(
                "Source and replica are the same directory: {}",
                source.display()
            )));
        }
        if replica.starts_with(&source) {
            return Err(Error::InvalidInput(format!(
                "Replica {} is inside source {}",
                replica.display(),
                source.display()
            )));
        }
        if source.starts_with(&replica) {
            return Err(Error::InvalidInput(format!(
                "Source {} is inside replica {}",
                source.display(),
                replica.display()
            )));
        }

        let log_file = absolutize(&self.log_file)?;
        for (role, root) in [("source", &source), ("replica", &replica)] {
            if log_file.starts_with(root) {
                return Err(Error::InvalidInput(format!(
                    "Log file {} is inside {} {}",
                    log_file.display(),
                    role,
                    root.display()
                )));
            }
        }
        Ok(())
    }
}

/// Resolve symlinks for the part of `path` that exists and append the rest.
fn absolutize(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)?;
    let mut existing = path.as_path();
    let mut rest = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                let mut resolved = canonical;
                resolved.extend(rest.iter().rev());
                return Ok(resolved);
            }
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    rest.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Ok(path),
            },
        }
    }
}
