//! Recursive enumeration of a directory tree relative to its root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use foldersync_common::{Error, RelativePath, Result};

/// Kind of a filesystem entry, as seen without following symbolic links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (never followed).
    Symlink,
    /// FIFO, socket or device node.
    Special,
}

impl EntryKind {
    fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        }
    }

    /// Probe what, if anything, exists at `path`.
    ///
    /// Returns `Ok(None)` only when the path does not exist.
    pub fn probe(path: &Path) -> io::Result<Option<Self>> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(Self::from_file_type(meta.file_type()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// One entry produced by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Location relative to the walked root.
    pub path: RelativePath,
    /// What the entry is.
    pub kind: EntryKind,
}

/// Walks a tree and reports every entry below its root.
///
/// Symbolic links are reported but never followed, so a link cycle cannot
/// make a walk infinite. Siblings are visited in file-name order.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
}

impl TreeWalker {
    /// Create a walker for the given root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this walker enumerates.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parents are yielded before their children.
    pub fn top_down(&self) -> Walk {
        self.walk(false)
    }

    /// Children are yielded before their parents.
    pub fn post_order(&self) -> Walk {
        self.walk(true)
    }

    fn walk(&self, contents_first: bool) -> Walk {
        let inner = match fs::symlink_metadata(&self.root) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            _ => Some(
                WalkDir::new(&self.root)
                    .follow_links(false)
                    .min_depth(1)
                    .sort_by_file_name()
                    .contents_first(contents_first)
                    .into_iter(),
            ),
        };

        Walk {
            root: self.root.clone(),
            inner,
        }
    }
}

/// A single lazy traversal started by [`TreeWalker`].
///
/// Traversal errors are yielded in place and the walk continues past them.
pub struct Walk {
    root: PathBuf,
    inner: Option<walkdir::IntoIter>,
}

impl Iterator for Walk {
    type Item = Result<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next()?;
        Some(match item {
            Ok(entry) => RelativePath::from_fs(&self.root, entry.path()).map(|path| TreeEntry {
                path,
                kind: EntryKind::from_file_type(entry.file_type()),
            }),
            Err(e) => Err(Error::Walk(e.to_string())),
        })
    }
}
