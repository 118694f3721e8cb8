pub mod api;
pub mod config;
pub mod live_sync;
pub mod path_guard;
pub mod scanner;
pub mod search;

pub use api::ApiService;
pub use config::{
    CatalogHandle, LiveSyncConfig, Project, ProjectCatalog, ProjectId, StaticCatalog,
    ViewerConfig, load_config,
};
pub use live_sync::{LiveSync, LiveSyncHandle, LiveSyncThread, Subscription, SyncEvent};
pub use path_guard::is_within;
pub use scanner::{Scan, ScanEntry, scan};
pub use search::{MatchKind, SearchResult, search};
