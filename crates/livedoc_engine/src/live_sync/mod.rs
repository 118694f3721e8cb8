/* 📖 # How does a change reach the browser?

1. A browser opens `/api/projects/{id}/events`; the handler calls
   `LiveSyncHandle::subscribe` and streams the returned `Subscription`
2. The live-sync thread registers the connection, starts a watch on the
   project root if it is the first subscriber, and sends `Connected`
3. The watch callback forwards Markdown changes as `FilesChanged`
4. The notifier waits until the project has been quiet for the debounce window
5. Every current subscriber receives one `Reload` and refetches the page
6. When the browser goes away the `Subscription` is dropped; after the last one
   the watch is released

Reloads carry no content. A client that misses one simply reloads on the next.
*/

mod hub;
mod notifier;
mod registry;
mod supervisor;

pub use hub::{LiveSync, LiveSyncCommand, LiveSyncHandle, LiveSyncThread, Subscription};
pub use notifier::DebouncedNotifier;
pub use registry::{Connection, ConnectionId, Removal, SubscriberRegistry};
pub use supervisor::WatchSupervisor;

use crate::config::ProjectId;

/// Event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// First event on every accepted subscription.
    Connected { project: ProjectId },
    /// Files in the project changed; refetch.
    Reload { project: ProjectId, timestamp: u64 },
    /// Keep-alive, lets a dead peer surface as a failed write.
    Heartbeat,
}
