/* 📖 # Why does the scanner never fail?

Directories come and go underneath a running viewer: a branch switch removes a
folder while a browser is listing it, a build tool creates a `node_modules`
tree mid-walk. A listing that errors out because of that is worse than one that
is briefly incomplete. So a missing root is an empty listing, an unreadable
entry is logged and skipped, and callers always get a sequence back.

Hidden entries and `node_modules` are pruned inside the walk, so their
subtrees are never read at all.
*/

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use livedoc_base::{FilePath, Pal, WalkEntry, WalkOptions};

/// Dependency directory that is skipped at any depth.
pub const EXCLUDED_DIRECTORY: &str = "node_modules";

/// Whether an entry with this name is left out of scans.
pub fn is_excluded(name: &str) -> bool {
    name.starts_with('.') || name == EXCLUDED_DIRECTORY
}

/// Whether any `/`-separated segment of `path` is excluded from scans.
pub fn has_excluded_segment(path: &str) -> bool {
    path.split('/')
        .any(|segment| !matches!(segment, "" | "." | "..") && is_excluded(segment))
}

/// Whether a file name or path has the Markdown extension (case-insensitive).
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("md"))
}

/// One entry yielded by a scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanEntry {
    /// A Markdown file.
    File(FilePath),
    /// A subdirectory (only yielded by non-recursive scans).
    Directory(FilePath),
}

impl ScanEntry {
    pub fn path(&self) -> &FilePath {
        match self {
            ScanEntry::File(path) | ScanEntry::Directory(path) => path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ScanEntry::Directory(_))
    }
}

/// Directories render with a trailing `/`.
impl fmt::Display for ScanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEntry::File(path) => write!(f, "{}", path),
            ScanEntry::Directory(path) => write!(f, "{}/", path),
        }
    }
}

/// A restartable scan of one directory.
///
/// Nothing is read until [`Scan::iter`] is called; each call walks the
/// directory afresh, so the result reflects the tree at that moment.
///
/// # Examples
///
/// ```
/// use livedoc_base::{FilePath, MockPal};
/// use livedoc_engine::scanner::scan;
///
/// let pal = MockPal::new();
/// pal.add_file("/docs/index.md", "# Home");
/// pal.add_file("/docs/.drafts/wip.md", "");
///
/// let listing = scan(&pal, "/docs".as_ref(), &FilePath::from(""), true);
/// let paths: Vec<String> = listing.iter().map(|entry| entry.to_string()).collect();
/// assert_eq!(paths, vec!["index.md"]);
/// ```
pub struct Scan<'a> {
    pal: &'a dyn Pal,
    directory: PathBuf,
    prefix: FilePath,
    recursive: bool,
}

/// Scan `directory`, reporting paths relative to it with `prefix` prepended.
///
/// Recursive scans yield Markdown files only, depth-first. Non-recursive scans
/// yield the Markdown files and the subdirectories directly inside `directory`.
/// Order is traversal order; sort if a stable order is needed.
pub fn scan<'a>(pal: &'a dyn Pal, directory: &Path, prefix: &FilePath, recursive: bool) -> Scan<'a> {
    Scan {
        pal,
        directory: directory.to_path_buf(),
        prefix: prefix.clone(),
        recursive,
    }
}

impl<'a> Scan<'a> {
    /// Walk the directory and yield its entries.
    pub fn iter(&self) -> impl Iterator<Item = ScanEntry> + '_ {
        let options = if self.recursive {
            WalkOptions::recursive()
        } else {
            WalkOptions::shallow()
        }
        .with_skip(is_excluded);

        // An excluded directory is skipped as a scan root too, not just below one.
        let walk = if has_excluded_segment(self.prefix.as_str()) {
            debug!(prefix = %self.prefix, "Scan prefix is excluded");
            None
        } else {
            match self.pal.walk_directory(&self.directory, options) {
                Ok(walk) => Some(walk),
                Err(error) if error.is_not_found() => {
                    debug!(directory = %self.directory.display(), "Scan root does not exist");
                    None
                }
                Err(error) => {
                    warn!(directory = %self.directory.display(), %error, "Failed to scan directory");
                    None
                }
            }
        };

        walk.into_iter().flatten().filter_map(|entry| match entry {
            Ok(entry) => self.classify(entry),
            Err(error) => {
                warn!(directory = %self.directory.display(), %error, "Skipping unreadable entry");
                None
            }
        })
    }

    /// Markdown files yielded by this scan, ignoring directories.
    pub fn files(&self) -> impl Iterator<Item = FilePath> + '_ {
        self.iter().filter_map(|entry| match entry {
            ScanEntry::File(path) => Some(path),
            ScanEntry::Directory(_) => None,
        })
    }

    fn classify(&self, entry: WalkEntry) -> Option<ScanEntry> {
        let path = self.prefix.join(entry.path.as_str());
        if entry.is_dir {
            return (!self.recursive).then_some(ScanEntry::Directory(path));
        }
        is_markdown(Path::new(entry.path.as_str())).then_some(ScanEntry::File(path))
    }
}
