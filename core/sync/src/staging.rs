//! Staged copies for atomic writes into the replica.
//!
//! A copy is first written in full to a temporary file next to its
//! destination, then renamed over the destination. Observers of the
//! destination path see either the previous file or the new one, never a
//! partially written file.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use foldersync_common::{Error, Result};

/// Suffix carried by every temporary file created for a staged copy.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Longest slice of the destination name kept in a temporary name, in bytes.
///
/// Keeps temporary names well under the usual 255-byte name limit however
/// long the destination name is.
const NAME_PREFIX_MAX: usize = 64;

/// A fully written copy waiting to be committed onto its destination.
///
/// Dropping a `StagedCopy` without committing removes the temporary file.
#[derive(Debug)]
pub struct StagedCopy {
    temp_path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl StagedCopy {
    /// Copy `source` into a temporary file beside `destination`.
    ///
    /// Content is flushed to disk before returning. Permissions and
    /// access/modification times are copied from the source where the
    /// platform allows.
    ///
    /// # Errors
    /// - The source cannot be read
    /// - The destination's directory is missing or not writable
    pub fn stage(source: &Path, destination: &Path) -> Result<Self> {
        let temp_path = temp_path_for(destination)?;
        let input = File::open(source)?;
        let source_meta = input.metadata()?;

        let output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        // From here on the guard owns the temporary and cleans it up on error.
        let staged = Self {
            temp_path,
            destination: destination.to_path_buf(),
            committed: false,
        };

        let mut writer = BufWriter::new(output);
        io::copy(&mut BufReader::new(input), &mut writer)?;
        let output = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        output.sync_all()?;

        let mut times = FileTimes::new();
        if let Ok(modified) = source_meta.modified() {
            times = times.set_modified(modified);
        }
        if let Ok(accessed) = source_meta.accessed() {
            times = times.set_accessed(accessed);
        }
        if let Err(e) = output.set_times(times) {
            debug!("Cannot copy timestamps to {}: {}", staged.temp_path.display(), e);
        }
        drop(output);

        if let Err(e) = fs::set_permissions(&staged.temp_path, source_meta.permissions()) {
            debug!("Cannot copy permissions to {}: {}", staged.temp_path.display(), e);
        }

        Ok(staged)
    }

    /// Path of the temporary file holding the staged content.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Final path the copy is committed to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Atomically replace the destination with the staged content.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp_path, &self.destination)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedCopy {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.temp_path) {
            Ok(()) => debug!("Discarded staged copy {}", self.temp_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staged copy {}: {}",
                self.temp_path.display(),
                e
            ),
        }
    }
}

/// Copy `source` onto `destination` through a [`StagedCopy`].
pub fn copy_atomic(source: &Path, destination: &Path) -> Result<()> {
    StagedCopy::stage(source, destination)?.commit()
}

fn temp_path_for(destination: &Path) -> Result<PathBuf> {
    let file_name = destination.file_name().ok_or_else(|| {
        Error::InvalidPath(format!("No file name in {}", destination.display()))
    })?;
    let file_name = file_name.to_string_lossy();
    let temp_name = format!(
        ".{}.{}{}",
        truncate_on_char_boundary(&file_name, NAME_PREFIX_MAX),
        Uuid::new_v4(),
        STAGING_SUFFIX
    );
    Ok(destination.with_file_name(temp_name))
}

fn truncate_on_char_boundary(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
