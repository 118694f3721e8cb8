/* 📖 # Why is the path check purely lexical?

Every request that names a file inside a project (tree listings today, file
reads in the page collaborators) carries a caller-supplied path. The check has
to reject `..` escapes and absolute overrides before anything touches disk,
and it has to give the same answer whether or not the target exists yet.
Resolving `.` and `..` textually, the way `RelativePath::normalize` does,
satisfies both: no I/O, no dependence on the current state of the tree.

Symlinks inside a project are followed by the filesystem layer as usual; the
guard only covers what the caller can express in the path string.
*/

use std::path::Path;

use relative_path::{Component, RelativePath, RelativePathBuf};

/// Returns true if `relative` resolves to `root` itself or to a location below it.
///
/// Backslashes are treated as separators. An absolute `relative` is accepted
/// only if it points inside `root`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use livedoc_engine::path_guard::is_within;
///
/// let root = Path::new("/srv/docs");
/// assert!(is_within(root, "guide/install.md"));
/// assert!(is_within(root, "guide/../index.md"));
/// assert!(!is_within(root, "../secrets.md"));
/// assert!(!is_within(root, "/etc/passwd"));
/// ```
pub fn is_within(root: &Path, relative: &str) -> bool {
    let relative = relative.replace('\\', "/");
    if !is_absolute(&relative) {
        return normalize_relative(&relative).is_some();
    }

    let root = absolute_segments(&root.to_string_lossy().replace('\\', "/"));
    let target = absolute_segments(&relative);
    target.starts_with(&root)
}

/// Normalized form of a relative path that stays inside its root.
///
/// Returns `None` for absolute paths and for paths that climb above the root.
pub fn normalize_relative(relative: &str) -> Option<RelativePathBuf> {
    let relative = relative.replace('\\', "/");
    if is_absolute(&relative) {
        return None;
    }
    let normalized = RelativePath::new(&relative).normalize();
    match normalized.components().next() {
        Some(Component::ParentDir) => None,
        _ => Some(normalized),
    }
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    // Windows drive prefix, e.g. `C:/docs`
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Lexically normalized segments of an absolute path; `..` at the top is dropped.
fn absolute_segments(path: &str) -> Vec<String> {
    RelativePath::new(path.trim_start_matches('/'))
        .normalize()
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string()),
            Component::CurDir | Component::ParentDir => None,
        })
        .collect()
}
