use std::time::{Duration, Instant};

use livedoc_base::{PalHandle, RealPal};
use livedoc_engine::{LiveSync, LiveSyncConfig, Project, ProjectId, StaticCatalog, SyncEvent};

#[test]
fn writing_a_markdown_file_reloads_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::write(root.join("index.md"), "# Start").unwrap();

    let catalog = StaticCatalog::new(vec![Project::new("docs", "Docs", &root)]).into_handle();
    let config = LiveSyncConfig {
        debounce_ms: 100,
        heartbeat_secs: 3600,
    };
    let live_sync = LiveSync::start(PalHandle::new(RealPal::new()), catalog, &config).unwrap();
    let handle = live_sync.handle();
    let first = handle.subscribe(&ProjectId::from("docs")).unwrap();
    let second = handle.subscribe(&ProjectId::from("docs")).unwrap();
    for subscription in [&first, &second] {
        assert!(matches!(
            subscription.recv_timeout(Duration::from_secs(2)),
            Ok(SyncEvent::Connected { .. })
        ));
    }

    std::fs::write(root.join("index.md"), "# Changed").unwrap();

    for subscription in [&first, &second] {
        let deadline = Instant::now() + Duration::from_secs(5);
        let reload = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match subscription.recv_timeout(remaining) {
                Ok(SyncEvent::Reload { project, .. }) => break Some(project),
                Ok(_) => continue,
                Err(_) => break None,
            }
        };
        assert_eq!(reload, Some(ProjectId::from("docs")));
    }

    drop(first);
    drop(second);
    live_sync.shutdown().unwrap();
}
