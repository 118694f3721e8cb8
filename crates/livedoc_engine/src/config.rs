/* 📖 # Why is the project list read-only?

The viewer only needs to answer "where is project X on disk?". Adding, renaming
and removing projects is done by editing `livedoc.toml` and restarting. The
live-sync hub and the API therefore see projects through the `ProjectCatalog`
trait and never mutate it, and tests can hand in a catalog built in code.
*/

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use livedoc_base::{LivedocResult, Pal, ResultExt, bail};

/// Opaque project identifier, used in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rooted tree of Markdown documents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Absolute filesystem root (relative roots are resolved at load time).
    pub root: PathBuf,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            root: root.into(),
        }
    }
}

/// Lookup of configured projects.
pub trait ProjectCatalog: fmt::Debug + Send + Sync + 'static {
    fn find_project(&self, id: &ProjectId) -> Option<Project>;

    /// All projects in configuration order.
    fn projects(&self) -> Vec<Project>;
}

pub type CatalogHandle = Arc<dyn ProjectCatalog>;

/// Catalog backed by a fixed list, usually the `[[project]]` tables of the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    projects: Vec<Project>,
}

impl StaticCatalog {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    pub fn into_handle(self) -> CatalogHandle {
        Arc::new(self)
    }
}

impl ProjectCatalog for StaticCatalog {
    fn find_project(&self, id: &ProjectId) -> Option<Project> {
        self.projects.iter().find(|project| &project.id == id).cloned()
    }

    fn projects(&self) -> Vec<Project> {
        self.projects.clone()
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timing of the live-sync hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LiveSyncConfig {
    /// Quiet period after the last change before subscribers are told to reload.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Interval between keep-alive messages on open streams.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

/// Contents of `livedoc.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub live_sync: LiveSyncConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(rename = "project")]
    pub projects: Vec<Project>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4400
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_heartbeat_secs() -> u64 {
    15
}
fn default_search_limit() -> usize {
    crate::search::DEFAULT_LIMIT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LiveSyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

/// Longest accepted heartbeat interval (one day).
pub const MAX_HEARTBEAT_SECS: u64 = 86_400;
/// Longest accepted debounce window (one minute).
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

impl LiveSyncConfig {
    /// Reject timings the hub cannot schedule.
    pub fn validate(&self) -> LivedocResult<()> {
        if self.heartbeat_secs == 0 || self.heartbeat_secs > MAX_HEARTBEAT_SECS {
            bail!(
                "live_sync.heartbeat_secs must be between 1 and {}, got {}",
                MAX_HEARTBEAT_SECS,
                self.heartbeat_secs
            );
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            bail!(
                "live_sync.debounce_ms must be at most {}, got {}",
                MAX_DEBOUNCE_MS,
                self.debounce_ms
            );
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

impl ViewerConfig {
    /// Parse config text; relative project roots are resolved against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> LivedocResult<Self> {
        let mut config: ViewerConfig = match toml::from_str(text) {
            Ok(config) => config,
            Err(error) => bail!("Invalid configuration: {}", error),
        };

        let mut seen = HashSet::new();
        for project in &mut config.projects {
            if !seen.insert(project.id.clone()) {
                bail!("Duplicate project id '{}'", project.id);
            }
            if project.root.is_relative() {
                project.root = base_dir.join(&project.root);
            }
        }
        config.live_sync.validate()?;
        Ok(config)
    }

    pub fn catalog(&self) -> CatalogHandle {
        StaticCatalog::new(self.projects.clone()).into_handle()
    }
}

/// Load and validate the configuration file at `path`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use livedoc_base::MockPal;
/// use livedoc_engine::load_config;
///
/// let pal = MockPal::new();
/// pal.add_file("/site/livedoc.toml", "[[project]]\nid = \"docs\"\nname = \"Docs\"\nroot = \"docs\"\n");
///
/// let config = load_config(&pal, Path::new("/site/livedoc.toml")).unwrap();
/// assert_eq!(config.projects[0].root, Path::new("/site/docs"));
/// assert_eq!(config.server.port, 4400);
/// ```
pub fn load_config(pal: &dyn Pal, path: &Path) -> LivedocResult<ViewerConfig> {
    debug!(path = %path.display(), "Loading configuration");
    let text = pal
        .read_file_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let base_dir = path.parent().unwrap_or(Path::new(""));
    let config = ViewerConfig::parse(&text, base_dir)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    info!(
        path = %path.display(),
        projects = config.projects.len(),
        "Configuration loaded"
    );
    Ok(config)
}
