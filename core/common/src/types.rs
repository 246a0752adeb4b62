//! Common types used throughout foldersync.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A path relative to a tree root, independent of which root it is applied to.
///
/// The same `RelativePath` names an entry under the source tree and its
/// counterpart under the replica tree; [`RelativePath::resolve`] turns it into
/// a concrete filesystem path for either side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath {
    components: Vec<OsString>,
}

impl RelativePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from name components.
    ///
    /// # Preconditions
    /// - Components must be plain names: no separators, no `.` or `..`
    /// - Components must not be empty
    ///
    /// # Errors
    /// - Returns error if any component is invalid
    pub fn from_components<I, S>(components: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let components: Vec<OsString> = components.into_iter().map(Into::into).collect();
        for comp in &components {
            validate_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a `/`-separated string into a RelativePath.
    ///
    /// Leading and trailing separators are ignored.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }
        Self::from_components(path.split('/'))
    }

    /// Express `path` relative to `root`.
    ///
    /// # Errors
    /// - `path` is not located under `root`
    /// - The remainder contains anything other than plain names
    pub fn from_fs(root: &Path, path: &Path) -> crate::Result<Self> {
        let relative = path.strip_prefix(root).map_err(|_| {
            crate::Error::InvalidPath(format!(
                "{} is not under {}",
                path.display(),
                root.display()
            ))
        })?;

        let mut components = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => components.push(name.to_os_string()),
                other => {
                    return Err(crate::Error::InvalidPath(format!(
                        "Unexpected component {:?} in {}",
                        other.as_os_str(),
                        relative.display()
                    )))
                }
            }
        }
        Ok(Self { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&OsStr> {
        self.components.last().map(|s| s.as_os_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: impl AsRef<OsStr>) -> crate::Result<Self> {
        let child = child.as_ref();
        validate_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_os_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[OsString] {
        &self.components
    }

    /// Number of components; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Apply this path to a concrete tree root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for component in &self.components {
            path.push(component);
        }
        path
    }

    /// Convert to a `/`-separated string representation.
    ///
    /// Non-UTF-8 names are rendered lossily; use [`RelativePath::resolve`]
    /// for filesystem access.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            ".".to_string()
        } else {
            self.components
                .iter()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        }
    }
}

fn validate_component(comp: &OsStr) -> crate::Result<()> {
    if comp.is_empty() {
        return Err(crate::Error::InvalidPath(
            "Path component cannot be empty".to_string(),
        ));
    }
    let mut parsed = Path::new(comp).components();
    match (parsed.next(), parsed.next()) {
        (Some(Component::Normal(name)), None) if name == comp => Ok(()),
        _ => Err(crate::Error::InvalidPath(format!(
            "Path component must be a plain name: {:?}",
            comp
        ))),
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}
