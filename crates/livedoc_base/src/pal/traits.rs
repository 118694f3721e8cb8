use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::LivedocResult;

use super::file_path::FilePath;
use super::http::{HttpServerConfig, HttpServerHandle, HttpService};

/// File change event delivered to a watch callback.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Absolute paths reported by the OS for this event.
    pub changed_files: Vec<PathBuf>,
}

/// Callback invoked when watched files change.
///
/// Called from the watcher's own thread, so it must be `Send + Sync`.
pub type FileChangeCallback = Box<dyn Fn(FileChangeEvent) + Send + Sync>;

/// One entry produced by [`Pal::walk_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path relative to the walked root.
    pub path: FilePath,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Options for [`Pal::walk_directory`].
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Descend into subdirectories. When false only direct children are yielded.
    pub recursive: bool,
    /// Entries whose name makes this return true are neither yielded nor descended into.
    pub skip: fn(&str) -> bool,
}

impl WalkOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            skip: |_| false,
        }
    }

    pub fn shallow() -> Self {
        Self {
            recursive: false,
            skip: |_| false,
        }
    }

    pub fn with_skip(mut self, skip: fn(&str) -> bool) -> Self {
        self.skip = skip;
        self
    }
}

/// Registration of a directory watch.
///
/// The watch stays active for as long as the handle is alive; dropping it
/// unregisters the watch with the OS.
pub struct WatchHandle {
    root: PathBuf,
    _guard: Box<dyn Send>,
}

impl WatchHandle {
    /// Wrap whatever object keeps the underlying watch alive.
    pub fn new(root: PathBuf, guard: impl Send + 'static) -> Self {
        Self {
            root,
            _guard: Box::new(guard),
        }
    }

    /// Directory this handle watches.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .finish()
    }
}

/* 📖 # Why is Pal a trait instead of a struct?

Using a trait enables two key benefits:
1. **Testability**: MockPal implements Pal for fast, deterministic tests, including
   watch events fired on demand and unreadable files
2. **Flexibility**: Code depends on the abstraction, not the concrete implementation

The live-sync and search code never call `std::fs`, `notify` or `tiny_http` directly.
*/

/// Platform Abstraction Layer (PAL) trait providing filesystem, watch and HTTP operations.
///
/// Paths are absolute project locations; results of a walk are relative to the walked root.
pub trait Pal: std::fmt::Debug + Send + Sync + 'static {
    /// Read entire file contents as a UTF-8 string.
    fn read_file_to_string(&self, path: &Path) -> LivedocResult<String>;

    /// Walk a directory depth-first.
    ///
    /// The iterator is lazy: directories are only read when the walk reaches them.
    /// Returns an error if `root` does not exist or is not a directory.
    fn walk_directory(
        &self,
        root: &Path,
        options: WalkOptions,
    ) -> LivedocResult<Box<dyn Iterator<Item = LivedocResult<WalkEntry>> + '_>>;

    /// Watch a directory tree recursively.
    ///
    /// The callback is invoked asynchronously until the returned handle is dropped.
    fn watch_directory(
        &self,
        root: &Path,
        callback: FileChangeCallback,
    ) -> LivedocResult<WatchHandle>;

    /// Start an HTTP server with the given service.
    ///
    /// The server stops accepting connections once the handle is dropped or shut down.
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> LivedocResult<HttpServerHandle>;
}

/* 📖 # Why use Arc<dyn Pal> with PalHandle?

Arc enables cheap cloning of the entire PAL implementation, allowing it to be
shared across the live-sync thread, the HTTP request threads and the CLI.
PalHandle wraps this for ergonomic Deref access and Clone support.
*/

/// Handle to a PAL implementation, enabling shared ownership.
///
/// # Examples
///
/// ```no_run
/// use livedoc_base::{RealPal, PalHandle};
///
/// let pal = PalHandle::new(RealPal::new());
/// let pal_clone = pal.clone(); // Cheap clone, shares the same implementation
/// ```
#[derive(Debug, Clone)]
pub struct PalHandle(Arc<dyn Pal>);

impl PalHandle {
    /// Create a new PalHandle from a Pal implementation.
    pub fn new(pal: impl Pal + 'static) -> Self {
        Self(Arc::new(pal))
    }
}

impl std::ops::Deref for PalHandle {
    type Target = dyn Pal;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
