use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{LivedocError, LivedocResult, err};

use super::FilePath;
use super::http::{HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService};
use super::traits::{FileChangeCallback, FileChangeEvent, Pal, WalkEntry, WalkOptions, WatchHandle};

/* 📖 # Why does MockPal simulate watches and unreadable files?

The interesting behaviour of the live-sync core happens at the edges: a watch
that fails to register, a file that disappears between scan and read, a burst of
change events. MockPal lets tests trigger each of these deterministically:
`emit_change` fires registered watch callbacks synchronously, `add_unreadable_file`
makes reads fail with a permission error, `fail_watches_under` makes watch
registration fail. Nothing touches the real filesystem.
*/

#[derive(Debug, Clone)]
enum MockFile {
    Content(String),
    Unreadable,
}

struct MockWatch {
    id: u64,
    root: PathBuf,
    callback: Arc<FileChangeCallback>,
}

type WatchTable = Arc<Mutex<Vec<MockWatch>>>;

/// Removes its watch registration from the mock when dropped.
struct MockWatchGuard {
    id: u64,
    watches: WatchTable,
}

impl Drop for MockWatchGuard {
    fn drop(&mut self) {
        self.watches.lock().retain(|watch| watch.id != self.id);
    }
}

/// In-memory PAL implementation for testing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use livedoc_base::{MockPal, Pal};
///
/// let mock = MockPal::new();
/// mock.add_file("/docs/readme.md", "# Readme");
/// let content = mock.read_file_to_string(Path::new("/docs/readme.md")).unwrap();
/// assert_eq!(content, "# Readme");
/// ```
#[derive(Clone)]
pub struct MockPal {
    files: Arc<Mutex<HashMap<PathBuf, MockFile>>>,
    directories: Arc<Mutex<HashSet<PathBuf>>>,
    failing_watch_roots: Arc<Mutex<HashSet<PathBuf>>>,
    watches: WatchTable,
    next_watch_id: Arc<AtomicU64>,
    http_servers: Arc<Mutex<HashMap<u16, Arc<dyn HttpService>>>>,
    next_port: Arc<AtomicU16>,
}

impl std::fmt::Debug for MockPal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPal")
            .field("files", &self.files.lock().len())
            .field("watches", &self.watches.lock().len())
            .finish()
    }
}

impl MockPal {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            directories: Arc::new(Mutex::new(HashSet::new())),
            failing_watch_roots: Arc::new(Mutex::new(HashSet::new())),
            watches: Arc::new(Mutex::new(Vec::new())),
            next_watch_id: Arc::new(AtomicU64::new(1)),
            http_servers: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(10000)),
        }
    }

    /// Add (or overwrite) a readable file. Parent directories exist implicitly.
    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .lock()
            .insert(path.into(), MockFile::Content(content.into()));
    }

    /// Add a file that is listed by walks but fails to read with a permission error.
    pub fn add_unreadable_file(&self, path: impl Into<PathBuf>) {
        self.files.lock().insert(path.into(), MockFile::Unreadable);
    }

    /// Add an (empty) directory.
    pub fn add_directory(&self, path: impl Into<PathBuf>) {
        self.directories.lock().insert(path.into());
    }

    /// Remove a file, as if it was deleted between listing and reading.
    pub fn remove_file(&self, path: &Path) {
        self.files.lock().remove(path);
    }

    /// Make every future watch registration at or below `root` fail.
    pub fn fail_watches_under(&self, root: impl Into<PathBuf>) {
        self.failing_watch_roots.lock().insert(root.into());
    }

    /// Undo [`MockPal::fail_watches_under`] for `root`.
    pub fn allow_watches_under(&self, root: &Path) {
        self.failing_watch_roots.lock().remove(root);
    }

    /// Number of currently registered watches.
    pub fn active_watch_count(&self) -> usize {
        self.watches.lock().len()
    }

    /// Whether a watch is currently registered for exactly this root.
    pub fn is_watching(&self, root: &Path) -> bool {
        self.watches.lock().iter().any(|watch| watch.root == root)
    }

    /// Fire the callbacks of every watch whose root contains one of `paths`.
    ///
    /// Callbacks run synchronously on the calling thread, outside any lock.
    pub fn emit_change(&self, paths: &[&Path]) {
        let callbacks: Vec<(Arc<FileChangeCallback>, Vec<PathBuf>)> = self
            .watches
            .lock()
            .iter()
            .filter_map(|watch| {
                let changed: Vec<PathBuf> = paths
                    .iter()
                    .filter(|path| path.starts_with(&watch.root))
                    .map(|path| path.to_path_buf())
                    .collect();
                (!changed.is_empty()).then(|| (watch.callback.clone(), changed))
            })
            .collect();

        for (callback, changed_files) in callbacks {
            callback(FileChangeEvent { changed_files });
        }
    }

    /// Invoke the service registered on `port` directly.
    pub fn simulate_request(&self, port: u16, request: HttpRequest) -> LivedocResult<HttpResponse> {
        let service = self
            .http_servers
            .lock()
            .get(&port)
            .cloned()
            .ok_or_else(|| err!("No HTTP server registered on port {}", port))?;
        service.handle_request(request)
    }

    fn directory_exists(&self, path: &Path) -> bool {
        self.directories.lock().iter().any(|dir| dir.starts_with(path))
            || self
                .files
                .lock()
                .keys()
                .any(|file| file != path && file.starts_with(path))
    }

    /// Direct children of `dir`, sorted by name, with their directory flag.
    fn children_of(&self, dir: &Path) -> BTreeMap<String, bool> {
        let mut children = BTreeMap::new();
        let mut record = |path: &Path, is_leaf_dir: bool| {
            let Ok(relative) = path.strip_prefix(dir) else {
                return;
            };
            let mut components = relative.components();
            let Some(first) = components.next() else {
                return;
            };
            let is_dir = is_leaf_dir || components.next().is_some();
            let name = first.as_os_str().to_string_lossy().into_owned();
            *children.entry(name).or_insert(false) |= is_dir;
        };

        for file in self.files.lock().keys() {
            record(file, false);
        }
        for directory in self.directories.lock().iter() {
            record(directory, true);
        }
        children
    }

    fn walk_into(
        &self,
        dir: &Path,
        relative: &FilePath,
        options: WalkOptions,
        out: &mut Vec<WalkEntry>,
    ) {
        for (name, is_dir) in self.children_of(dir) {
            if (options.skip)(&name) {
                continue;
            }
            let path = relative.join(&name);
            out.push(WalkEntry {
                path: path.clone(),
                is_dir,
            });
            if is_dir && options.recursive {
                self.walk_into(&dir.join(&name), &path, options, out);
            }
        }
    }
}

impl Default for MockPal {
    fn default() -> Self {
        Self::new()
    }
}

impl Pal for MockPal {
    fn read_file_to_string(&self, path: &Path) -> LivedocResult<String> {
        match self.files.lock().get(path) {
            Some(MockFile::Content(content)) => Ok(content.clone()),
            Some(MockFile::Unreadable) => Err(Box::new(LivedocError::file(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
            ))),
            None => Err(Box::new(LivedocError::file(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            ))),
        }
    }

    fn walk_directory(
        &self,
        root: &Path,
        options: WalkOptions,
    ) -> LivedocResult<Box<dyn Iterator<Item = LivedocResult<WalkEntry>> + '_>> {
        if !self.directory_exists(root) {
            return Err(Box::new(LivedocError::file(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "directory not found"),
            )));
        }
        let mut entries = Vec::new();
        self.walk_into(root, &FilePath::from(""), options, &mut entries);
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn watch_directory(
        &self,
        root: &Path,
        callback: FileChangeCallback,
    ) -> LivedocResult<WatchHandle> {
        if self
            .failing_watch_roots
            .lock()
            .iter()
            .any(|failing| root.starts_with(failing))
        {
            return Err(err!("Simulated watch failure for {}", root.display()));
        }
        if !self.directory_exists(root) {
            return Err(Box::new(LivedocError::file(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "watch root not found"),
            )));
        }

        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        self.watches.lock().push(MockWatch {
            id,
            root: root.to_path_buf(),
            callback: Arc::new(callback),
        });
        Ok(WatchHandle::new(
            root.to_path_buf(),
            MockWatchGuard {
                id,
                watches: self.watches.clone(),
            },
        ))
    }

    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> LivedocResult<HttpServerHandle> {
        let port = match config.port {
            Some(port) => port,
            None => self.next_port.fetch_add(1, Ordering::SeqCst),
        };
        self.http_servers.lock().insert(port, Arc::from(service));
        let (handle, _shutdown) = HttpServerHandle::new(port);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn walk(mock: &MockPal, root: &str, options: WalkOptions) -> Vec<(String, bool)> {
        mock.walk_directory(Path::new(root), options)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (entry.path.to_string(), entry.is_dir)
            })
            .collect()
    }

    #[test]
    fn test_read_files() {
        let mock = MockPal::new();
        mock.add_file("/p/a.md", "alpha");
        mock.add_unreadable_file("/p/locked.md");

        assert_eq!(mock.read_file_to_string(Path::new("/p/a.md")).unwrap(), "alpha");
        let locked = mock.read_file_to_string(Path::new("/p/locked.md")).unwrap_err();
        assert!(!locked.is_not_found());
        let missing = mock.read_file_to_string(Path::new("/p/none.md")).unwrap_err();
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_walk_is_depth_first() {
        let mock = MockPal::new();
        mock.add_file("/p/z.md", "");
        mock.add_file("/p/guide/b.md", "");
        mock.add_file("/p/guide/deep/c.md", "");
        mock.add_directory("/p/empty");

        assert_eq!(
            walk(&mock, "/p", WalkOptions::recursive()),
            vec![
                ("empty".to_string(), true),
                ("guide".to_string(), true),
                ("guide/b.md".to_string(), false),
                ("guide/deep".to_string(), true),
                ("guide/deep/c.md".to_string(), false),
                ("z.md".to_string(), false),
            ]
        );
        assert_eq!(
            walk(&mock, "/p", WalkOptions::shallow()),
            vec![
                ("empty".to_string(), true),
                ("guide".to_string(), true),
                ("z.md".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_walk_missing_root_fails() {
        let mock = MockPal::new();
        mock.add_file("/p/a.md", "");
        let error = mock
            .walk_directory(Path::new("/q"), WalkOptions::recursive())
            .err()
            .unwrap();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_watch_emit_and_drop() {
        let mock = MockPal::new();
        mock.add_directory("/p");
        let (sender, receiver) = mpsc::channel();
        let handle = mock
            .watch_directory(
                Path::new("/p"),
                Box::new(move |event| {
                    let _ = sender.send(event);
                }),
            )
            .unwrap();
        assert!(mock.is_watching(Path::new("/p")));

        mock.emit_change(&[Path::new("/p/a.md"), Path::new("/other/b.md")]);
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.changed_files, vec![PathBuf::from("/p/a.md")]);

        drop(handle);
        assert_eq!(mock.active_watch_count(), 0);
        mock.emit_change(&[Path::new("/p/a.md")]);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_watch_failures() {
        let mock = MockPal::new();
        mock.add_directory("/p");
        mock.fail_watches_under("/p");
        assert!(mock.watch_directory(Path::new("/p"), Box::new(|_| {})).is_err());
        assert!(mock.watch_directory(Path::new("/missing"), Box::new(|_| {})).is_err());
        assert_eq!(mock.active_watch_count(), 0);

        mock.allow_watches_under(Path::new("/p"));
        assert!(mock.watch_directory(Path::new("/p"), Box::new(|_| {})).is_ok());
    }

    #[test]
    fn test_simulate_request() {
        #[derive(Debug)]
        struct Echo;
        impl HttpService for Echo {
            fn handle_request(&self, request: HttpRequest) -> LivedocResult<HttpResponse> {
                Ok(HttpResponse::text(request.path().to_string()))
            }
        }

        let mock = MockPal::new();
        let handle = mock
            .start_http_server(Box::new(Echo), HttpServerConfig::default())
            .unwrap();
        let response = mock
            .simulate_request(handle.port(), HttpRequest::get("/echo?x=1"))
            .unwrap();
        assert_eq!(response.body().as_string(), Some("/echo".to_string()));
        assert!(mock.simulate_request(1, HttpRequest::get("/")).is_err());
    }
}
