use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::ErrorKind;
use crate::{LivedocError, LivedocResult, err};

use super::FilePath;
use super::http::{
    HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle,
    HttpService, HttpStatusCode, should_stop,
};
use super::traits::{
    FileChangeCallback, FileChangeEvent, Pal, WalkEntry, WalkOptions, WatchHandle,
};

/* 📖 # Why threads and blocking I/O instead of async?

The server handles a handful of local browser tabs. A thread per request keeps
streaming responses trivial: the request thread simply blocks reading the next
event and writes it out. std::fs, walkdir, notify's own watcher thread and
tiny_http all fit that model without pulling in an async runtime.
*/

/// How often the accept loop checks whether it has been asked to stop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Concrete PAL implementation using the real filesystem, notify and tiny_http.
#[derive(Debug, Default)]
pub struct RealPal;

impl RealPal {
    pub fn new() -> Self {
        Self
    }
}

fn relative_file_path(path: &Path, root: &Path) -> Option<FilePath> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(FilePath::from(segments.join("/")))
}

fn not_found(path: &Path, what: &str) -> Box<LivedocError> {
    Box::new(LivedocError::file(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, what.to_string()),
    ))
}

impl Pal for RealPal {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn read_file_to_string(&self, path: &Path) -> LivedocResult<String> {
        fs::read_to_string(path).map_err(|e| {
            debug!(error = %e, "failed to read file");
            Box::new(LivedocError::file(path, e))
        })
    }

    #[instrument(skip(self, options), fields(root = %root.display(), recursive = options.recursive))]
    fn walk_directory(
        &self,
        root: &Path,
        options: WalkOptions,
    ) -> LivedocResult<Box<dyn Iterator<Item = LivedocResult<WalkEntry>> + '_>> {
        if !root.is_dir() {
            debug!("directory not found");
            return Err(not_found(root, "directory not found"));
        }

        let max_depth = if options.recursive { usize::MAX } else { 1 };
        let skip = options.skip;
        let root = root.to_path_buf();
        let iter = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            // the root itself is passed to the predicate too, never prune it
            .filter_entry(move |entry| {
                entry.depth() == 0 || !skip(&entry.file_name().to_string_lossy())
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => relative_file_path(entry.path(), &root).map(|path| {
                    Ok(WalkEntry {
                        path,
                        is_dir: entry.file_type().is_dir(),
                    })
                }),
                Err(e) => {
                    debug!(error = %e, "error walking directory");
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.clone());
                    Some(Err(Box::new(LivedocError::file(
                        path,
                        std::io::Error::other(e.to_string()),
                    ))))
                }
            });

        Ok(Box::new(iter))
    }

    #[instrument(skip(self, callback), fields(root = %root.display()))]
    fn watch_directory(
        &self,
        root: &Path,
        callback: FileChangeCallback,
    ) -> LivedocResult<WatchHandle> {
        if !root.is_dir() {
            return Err(not_found(root, "watch root not found"));
        }

        let watch_error = |source: notify::Error| {
            Box::new(LivedocError::new(ErrorKind::WatchError {
                path: root.to_path_buf(),
                source,
            }))
        };

        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<notify::Event>| match result {
                // reads (including our own search scans) must not look like changes
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
                Ok(event) => callback(FileChangeEvent {
                    changed_files: event.paths,
                }),
                Err(e) => warn!(error = %e, "filesystem watcher reported an error"),
            },
        )
        .map_err(watch_error)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(watch_error)?;

        debug!("directory watch registered");
        Ok(WatchHandle::new(root.to_path_buf(), watcher))
    }

    #[instrument(skip(self, service), fields(address = %config.address()))]
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> LivedocResult<HttpServerHandle> {
        let address = config.address();
        let server = tiny_http::Server::http(&address)
            .map_err(|e| err!("Failed to bind HTTP server to {}: {}", address, e))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or_default();

        let (handle, shutdown) = HttpServerHandle::new(port);
        let service: Arc<dyn HttpService> = Arc::from(service);

        thread::Builder::new()
            .name("http-accept".to_string())
            .spawn(move || {
                while !should_stop(&shutdown) {
                    match server.recv_timeout(ACCEPT_POLL_INTERVAL) {
                        Ok(Some(request)) => {
                            let service = service.clone();
                            let spawned = thread::Builder::new()
                                .name("http-request".to_string())
                                .spawn(move || serve_request(service.as_ref(), request));
                            if let Err(e) = spawned {
                                warn!(error = %e, "failed to spawn request thread");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, "HTTP accept loop failed");
                            break;
                        }
                    }
                }
                info!("HTTP server stopped");
            })
            .map_err(|e| err!("Failed to spawn HTTP accept thread: {}", e))?;

        info!(port, "HTTP server listening");
        Ok(handle)
    }
}

fn serve_request(service: &dyn HttpService, request: tiny_http::Request) {
    let Some(method) = HttpMethod::parse(request.method().as_str()) else {
        let response = tiny_http::Response::empty(HttpStatusCode::MethodNotAllowed.as_u16());
        if let Err(e) = request.respond(response) {
            debug!(error = %e, "failed to send response");
        }
        return;
    };

    let mut http_request = HttpRequest::new(method, request.url());
    for header in request.headers() {
        http_request =
            http_request.with_header(header.field.as_str().as_str(), header.value.as_str());
    }

    let url = request.url().to_string();
    let response = match service.handle_request(http_request) {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "request failed");
            HttpResponse::text(e.to_string())
                .with_status(HttpStatusCode::NetworkConnectTimeoutError)
        }
    };
    debug!(url = %url, status = response.status().as_u16(), "responding");

    if response.body().is_stream() {
        stream_response(request, response);
    } else {
        respond_fixed(request, response);
    }
}

fn respond_fixed(request: tiny_http::Request, response: HttpResponse) {
    let status = response.status().as_u16();
    let headers: Vec<tiny_http::Header> = response
        .headers()
        .iter()
        .filter_map(|(key, value)| {
            tiny_http::Header::from_bytes(key.as_bytes(), value.as_bytes()).ok()
        })
        .collect();
    let body = response.into_body();
    let length = body.known_length();
    let reply = tiny_http::Response::new(status.into(), headers, body.into_reader(), length, None);
    if let Err(e) = request.respond(reply) {
        debug!(error = %e, "failed to send response");
    }
}

/* 📖 # Why write streaming responses by hand?

tiny_http copies a response body through a buffered (and, for unknown lengths,
chunk-encoding) writer and only flushes at the end. An event stream never ends,
so its events would sit in that buffer. Instead we take the raw connection
writer, send the head ourselves with `Connection: close`, and flush after every
read from the body.
*/
fn stream_response(request: tiny_http::Request, response: HttpResponse) {
    let status = response.status();
    let mut head = format!("HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason_phrase());
    for (key, value) in response.headers().iter() {
        head.push_str(&format!("{}: {}\r\n", key, value));
    }
    head.push_str("Connection: close\r\n\r\n");

    let mut body: Box<dyn Read + Send> = match response.into_body() {
        HttpBody::Stream(reader) => reader,
        bytes => bytes.into_reader(),
    };
    let mut writer = request.into_writer();
    if let Err(e) = writer.write_all(head.as_bytes()).and_then(|_| writer.flush()) {
        debug!(error = %e, "client went away before stream started");
        return;
    }

    let mut buffer = [0u8; 4096];
    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                debug!(error = %e, "stream body failed");
                break;
            }
        };
        if let Err(e) = writer
            .write_all(&buffer[..read])
            .and_then(|_| writer.flush())
        {
            debug!(error = %e, "client disconnected from stream");
            break;
        }
    }
    debug!("stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, RealPal) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        (temp_dir, RealPal::new())
    }

    fn walk(pal: &RealPal, root: &Path, options: WalkOptions) -> Vec<WalkEntry> {
        let mut entries: Vec<WalkEntry> = pal
            .walk_directory(root, options)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    #[test]
    fn test_read_file() {
        let (temp_dir, pal) = setup_test_dir();
        fs::write(temp_dir.path().join("test.md"), "# hello").unwrap();

        let result = pal.read_file_to_string(&temp_dir.path().join("test.md")).unwrap();
        assert_eq!(result, "# hello");
    }

    #[test]
    fn test_read_file_not_found() {
        let (temp_dir, pal) = setup_test_dir();
        let error = pal
            .read_file_to_string(&temp_dir.path().join("missing.md"))
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_walk_directory_recursive() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir_all(temp_dir.path().join("guide/deep")).unwrap();
        fs::write(temp_dir.path().join("index.md"), "").unwrap();
        fs::write(temp_dir.path().join("guide/deep/setup.md"), "").unwrap();

        let entries = walk(&pal, temp_dir.path(), WalkOptions::recursive());
        let listed: Vec<(&str, bool)> = entries
            .iter()
            .map(|entry| (entry.path.as_str(), entry.is_dir))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("guide", true),
                ("guide/deep", true),
                ("guide/deep/setup.md", false),
                ("index.md", false),
            ]
        );
    }

    #[test]
    fn test_walk_directory_shallow() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir_all(temp_dir.path().join("guide")).unwrap();
        fs::write(temp_dir.path().join("guide/setup.md"), "").unwrap();
        fs::write(temp_dir.path().join("index.md"), "").unwrap();

        let entries = walk(&pal, temp_dir.path(), WalkOptions::shallow());
        let paths: Vec<&str> = entries.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["guide", "index.md"]);
    }

    #[test]
    fn test_walk_directory_prunes_skipped_names() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir_all(temp_dir.path().join("skipme/inner")).unwrap();
        fs::write(temp_dir.path().join("skipme/inner/a.md"), "").unwrap();
        fs::write(temp_dir.path().join("keep.md"), "").unwrap();

        fn skip(name: &str) -> bool {
            name == "skipme"
        }
        let entries = walk(&pal, temp_dir.path(), WalkOptions::recursive().with_skip(skip));
        let paths: Vec<&str> = entries.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["keep.md"]);
    }

    #[test]
    fn test_walk_directory_root_is_never_pruned() {
        let (temp_dir, pal) = setup_test_dir();
        let root = temp_dir.path().join(".hidden-root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.md"), "").unwrap();

        fn skip(name: &str) -> bool {
            name.starts_with('.')
        }
        let entries = walk(&pal, &root, WalkOptions::recursive().with_skip(skip));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_walk_directory_not_found() {
        let (temp_dir, pal) = setup_test_dir();
        let result = pal.walk_directory(&temp_dir.path().join("nonexistent"), WalkOptions::recursive());
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_directory_reports_changes() {
        let (temp_dir, pal) = setup_test_dir();
        let (sender, receiver) = mpsc::channel();
        let callback: FileChangeCallback = Box::new(move |event| {
            let _ = sender.send(event);
        });

        let handle = pal.watch_directory(temp_dir.path(), callback).unwrap();
        assert_eq!(handle.root(), temp_dir.path());

        fs::write(temp_dir.path().join("changed.md"), "# changed").unwrap();
        let event = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("expected a change event");
        assert!(
            event
                .changed_files
                .iter()
                .any(|path| path.ends_with("changed.md"))
        );
    }

    #[test]
    fn test_watch_directory_not_found() {
        let (temp_dir, pal) = setup_test_dir();
        let callback: FileChangeCallback = Box::new(|_event| {});
        let result = pal.watch_directory(&temp_dir.path().join("nonexistent"), callback);
        assert!(result.is_err());
    }

    #[derive(Debug)]
    struct HelloService;

    impl HttpService for HelloService {
        fn handle_request(&self, request: HttpRequest) -> LivedocResult<HttpResponse> {
            match request.path() {
                "/hello" => Ok(HttpResponse::text("hello")),
                "/stream" => Ok(HttpResponse::ok()
                    .with_content_type("text/event-stream")
                    .with_body(HttpBody::from_reader(std::io::Cursor::new(
                        b"data: one\n\n".to_vec(),
                    )))),
                _ => Err(err!("no route for {}", request.path())),
            }
        }
    }

    fn fetch(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_http_server_serves_fixed_and_streamed_bodies() {
        let pal = RealPal::new();
        let handle = pal
            .start_http_server(Box::new(HelloService), HttpServerConfig::default())
            .unwrap();
        assert_ne!(handle.port(), 0);

        let fixed = fetch(handle.port(), "/hello");
        assert!(fixed.starts_with("HTTP/1.1 200"));
        assert!(fixed.ends_with("hello"));

        let streamed = fetch(handle.port(), "/stream");
        assert!(streamed.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(streamed.contains("Content-Type: text/event-stream\r\n"));
        assert!(streamed.ends_with("\r\n\r\ndata: one\n\n"));

        let failed = fetch(handle.port(), "/nowhere");
        assert!(failed.starts_with("HTTP/1.1 599"));
        assert!(failed.contains("no route for /nowhere"));
    }
}
