use std::io::Read;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use livedoc_base::pal::http::{HttpRequest, HttpServerConfig};
use livedoc_base::{MockPal, Pal, PalHandle};
use livedoc_engine::{
    ApiService, LiveSync, LiveSyncConfig, LiveSyncThread, Project, ProjectId, StaticCatalog,
    Subscription, SyncEvent,
};

const DEBOUNCE_MS: u64 = 50;
const WAIT: Duration = Duration::from_secs(2);

fn start(mock: &MockPal) -> LiveSyncThread {
    mock.add_file("/x/index.md", "# X");
    mock.add_file("/y/index.md", "# Y");
    let catalog = StaticCatalog::new(vec![
        Project::new("x", "X", "/x"),
        Project::new("y", "Y", "/y"),
    ])
    .into_handle();
    let config = LiveSyncConfig {
        debounce_ms: DEBOUNCE_MS,
        heartbeat_secs: 3600,
    };
    LiveSync::start(PalHandle::new(mock.clone()), catalog, &config).unwrap()
}

fn subscribe(live_sync: &LiveSyncThread, project: &str) -> Subscription {
    let subscription = live_sync.handle().subscribe(&ProjectId::from(project)).unwrap();
    assert!(matches!(
        subscription.recv_timeout(WAIT),
        Ok(SyncEvent::Connected { .. })
    ));
    subscription
}

/// Collect every event that arrives within `window`.
fn drain(subscription: &Subscription, window: Duration) -> Vec<SyncEvent> {
    let deadline = Instant::now() + window;
    let mut events = Vec::new();
    while let Ok(event) =
        subscription.recv_timeout(deadline.saturating_duration_since(Instant::now()))
    {
        events.push(event);
    }
    events
}

fn reloads(events: &[SyncEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, SyncEvent::Reload { .. }))
        .count()
}

fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn burst_of_changes_produces_one_reload() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    let subscription = subscribe(&live_sync, "x");

    for _ in 0..5 {
        mock.emit_change(&[Path::new("/x/index.md")]);
        thread::sleep(Duration::from_millis(10));
    }

    let events = drain(&subscription, Duration::from_millis(DEBOUNCE_MS * 6));
    assert_eq!(reloads(&events), 1, "events: {events:?}");
    match &events[0] {
        SyncEvent::Reload { project, timestamp } => {
            assert_eq!(project, &ProjectId::from("x"));
            assert!(*timestamp > 0);
        }
        other => panic!("expected reload, got {other:?}"),
    }
    live_sync.shutdown().unwrap();
}

#[test]
fn separate_bursts_produce_separate_reloads() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    let subscription = subscribe(&live_sync, "x");

    mock.emit_change(&[Path::new("/x/a.md")]);
    assert_eq!(reloads(&drain(&subscription, Duration::from_millis(DEBOUNCE_MS * 4))), 1);
    mock.emit_change(&[Path::new("/x/a.md")]);
    assert_eq!(reloads(&drain(&subscription, Duration::from_millis(DEBOUNCE_MS * 4))), 1);
    live_sync.shutdown().unwrap();
}

#[test]
fn every_subscriber_gets_one_reload() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    let first = subscribe(&live_sync, "x");
    let second = subscribe(&live_sync, "x");
    let other_project = subscribe(&live_sync, "y");
    assert_eq!(mock.active_watch_count(), 2);

    mock.emit_change(&[Path::new("/x/guide/page.md")]);

    let window = Duration::from_millis(DEBOUNCE_MS * 6);
    assert_eq!(reloads(&drain(&first, window)), 1);
    assert_eq!(reloads(&drain(&second, Duration::ZERO)), 1);
    assert_eq!(reloads(&drain(&other_project, Duration::ZERO)), 0);
    live_sync.shutdown().unwrap();
}

#[test]
fn non_markdown_changes_are_ignored() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    let subscription = subscribe(&live_sync, "x");

    mock.emit_change(&[Path::new("/x/target/build.o"), Path::new("/x/notes.txt")]);

    let events = drain(&subscription, Duration::from_millis(DEBOUNCE_MS * 4));
    assert_eq!(reloads(&events), 0);
    live_sync.shutdown().unwrap();
}

#[test]
fn watch_lives_exactly_as_long_as_subscribers() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    assert_eq!(mock.active_watch_count(), 0);

    let first = subscribe(&live_sync, "x");
    let second = subscribe(&live_sync, "x");
    assert_eq!(mock.active_watch_count(), 1);

    drop(first);
    thread::sleep(Duration::from_millis(50));
    assert!(mock.is_watching(Path::new("/x")));

    drop(second);
    assert!(wait_for(|| mock.active_watch_count() == 0));

    let third = subscribe(&live_sync, "x");
    assert!(mock.is_watching(Path::new("/x")));
    drop(third);
    assert!(wait_for(|| mock.active_watch_count() == 0));
    live_sync.shutdown().unwrap();
}

#[test]
fn pending_reload_is_dropped_with_last_subscriber() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    let leaving = subscribe(&live_sync, "x");

    mock.emit_change(&[Path::new("/x/index.md")]);
    drop(leaving);
    assert!(wait_for(|| mock.active_watch_count() == 0));

    let late = subscribe(&live_sync, "x");
    let events = drain(&late, Duration::from_millis(DEBOUNCE_MS * 4));
    assert_eq!(reloads(&events), 0, "events: {events:?}");
    live_sync.shutdown().unwrap();
}

#[test]
fn failed_watch_is_retried_by_next_subscriber() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    mock.fail_watches_under("/y");

    let unwatched = subscribe(&live_sync, "y");
    assert_eq!(mock.active_watch_count(), 0);
    mock.emit_change(&[Path::new("/y/index.md")]);
    assert_eq!(reloads(&drain(&unwatched, Duration::from_millis(DEBOUNCE_MS * 3))), 0);

    mock.allow_watches_under(Path::new("/y"));
    let watched = subscribe(&live_sync, "y");
    assert!(mock.is_watching(Path::new("/y")));

    mock.emit_change(&[Path::new("/y/index.md")]);
    let window = Duration::from_millis(DEBOUNCE_MS * 6);
    assert_eq!(reloads(&drain(&unwatched, window)), 1);
    assert_eq!(reloads(&drain(&watched, Duration::ZERO)), 1);

    drop(unwatched);
    drop(watched);
    assert!(wait_for(|| mock.active_watch_count() == 0));
    live_sync.shutdown().unwrap();
}

#[test]
fn unknown_project_stream_ends_without_events() {
    let mock = MockPal::new();
    let live_sync = start(&mock);
    let catalog = StaticCatalog::new(vec![Project::new("x", "X", "/x")]).into_handle();
    let service = ApiService::new(PalHandle::new(mock.clone()), catalog, live_sync.handle(), 15);

    assert!(live_sync.handle().subscribe(&ProjectId::from("nope")).is_none());

    let port = mock
        .start_http_server(Box::new(service), HttpServerConfig::default())
        .unwrap()
        .port();
    let response = mock
        .simulate_request(port, HttpRequest::get("/api/projects/nope/events"))
        .unwrap();
    let mut body = String::new();
    response
        .into_body()
        .into_reader()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "");
    assert_eq!(mock.active_watch_count(), 0);
    live_sync.shutdown().unwrap();
}
