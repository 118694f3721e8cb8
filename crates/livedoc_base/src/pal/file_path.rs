use relative_path::{RelativePath, RelativePathBuf};
use std::path::Path;

/* 📖 # Why use RelativePathBuf for FilePath?

Paths handed to browsers (scan listings, search hits) are always relative to a
project root and always use `/` as separator, regardless of the host platform.
RelativePathBuf gives us exactly that representation, so a FilePath can be
serialized into JSON or a URL without further conversion.
*/

/// Project-relative path with `/` separators.
///
/// # Examples
///
/// ```
/// use livedoc_base::FilePath;
///
/// let path = FilePath::from("guides/install.md");
/// assert_eq!(path.file_name(), Some("install.md"));
/// assert_eq!(path.file_stem(), Some("install"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath(RelativePathBuf);

impl FilePath {
    /// Returns the underlying RelativePath.
    pub fn as_relative(&self) -> &RelativePath {
        &self.0
    }

    /// Returns the path as a `/` separated string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Resolve this path against a filesystem root.
    pub fn to_path(&self, root: &Path) -> std::path::PathBuf {
        self.0.to_path(root)
    }

    /// Append a child segment.
    pub fn join(&self, child: &str) -> Self {
        Self(self.0.join(child))
    }

    /// Final path segment.
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name()
    }

    /// Final path segment without its extension.
    pub fn file_stem(&self) -> Option<&str> {
        self.0.file_stem()
    }

    /// Extension of the final segment.
    pub fn extension(&self) -> Option<&str> {
        self.0.extension()
    }
}

impl From<&str> for FilePath {
    fn from(s: &str) -> Self {
        Self(RelativePathBuf::from(s))
    }
}

impl From<String> for FilePath {
    fn from(s: String) -> Self {
        Self(RelativePathBuf::from(s))
    }
}

impl From<RelativePathBuf> for FilePath {
    fn from(p: RelativePathBuf) -> Self {
        Self(p)
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<RelativePath> for FilePath {
    fn as_ref(&self) -> &RelativePath {
        &self.0
    }
}
