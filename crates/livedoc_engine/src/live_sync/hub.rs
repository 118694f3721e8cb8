use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, instrument, trace};

use livedoc_base::{LivedocError, LivedocResult, PalHandle};

use crate::config::{CatalogHandle, LiveSyncConfig, ProjectId};

use super::SyncEvent;
use super::notifier::DebouncedNotifier;
use super::registry::{Connection, ConnectionId, Removal, SubscriberRegistry};
use super::supervisor::WatchSupervisor;

/// Messages processed by the live-sync thread.
#[derive(Debug)]
pub enum LiveSyncCommand {
    Subscribe {
        project: ProjectId,
        connection: Connection,
    },
    Unsubscribe {
        project: ProjectId,
        connection: ConnectionId,
    },
    /// Markdown files changed below a watched project root.
    FilesChanged {
        project: ProjectId,
        paths: Vec<PathBuf>,
    },
    Shutdown,
}

/* 📖 # Why one thread that owns everything?

Subscribers, watches and pending reloads are only ever touched by the
live-sync thread. Connections opening and closing, watch callbacks and timer
expiry all arrive as `LiveSyncCommand`s or as deadlines on the same loop, so
they are handled strictly one after the other and none of the three
registries needs a lock. Deciding whether a project just lost its last
subscriber and tearing down its watch happen in the same step, so no change
event can slip in between.
*/

/// The live-sync event loop.
pub struct LiveSync {
    catalog: CatalogHandle,
    registry: SubscriberRegistry,
    supervisor: WatchSupervisor,
    notifier: DebouncedNotifier,
    heartbeat: Duration,
    next_heartbeat: Instant,
    commands: Receiver<LiveSyncCommand>,
}

impl LiveSync {
    /// Spawn the live-sync thread.
    pub fn start(
        pal: PalHandle,
        catalog: CatalogHandle,
        config: &LiveSyncConfig,
    ) -> LivedocResult<LiveSyncThread> {
        config.validate()?;
        let (sender, receiver) = mpsc::channel();
        let live_sync = LiveSync {
            catalog: catalog.clone(),
            registry: SubscriberRegistry::new(),
            supervisor: WatchSupervisor::new(pal, sender.clone()),
            notifier: DebouncedNotifier::new(config.debounce()),
            heartbeat: config.heartbeat(),
            next_heartbeat: Instant::now() + config.heartbeat(),
            commands: receiver,
        };

        let join = thread::Builder::new()
            .name("live-sync".to_string())
            .spawn(move || live_sync.run())
            .map_err(|error| {
                Box::new(LivedocError::message(format!(
                    "Failed to spawn live-sync thread: {error}"
                )))
            })?;
        info!(
            debounce_ms = config.debounce_ms,
            heartbeat_secs = config.heartbeat_secs,
            "Live sync started"
        );

        Ok(LiveSyncThread {
            handle: LiveSyncHandle {
                commands: sender,
                catalog,
            },
            join,
        })
    }

    fn run(mut self) {
        loop {
            let now = Instant::now();
            for project in self.notifier.take_due(now) {
                self.broadcast_reload(&project);
            }
            if now >= self.next_heartbeat {
                self.send_heartbeats();
                self.next_heartbeat = now + self.heartbeat;
            }

            let deadline = self
                .notifier
                .next_deadline()
                .map_or(self.next_heartbeat, |due| due.min(self.next_heartbeat));
            let timeout = deadline.saturating_duration_since(Instant::now());

            match self.commands.recv_timeout(timeout) {
                Ok(command) => {
                    if self.handle(command).is_break() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(
            watches = self.supervisor.watch_count(),
            "Live sync stopped"
        );
    }

    fn handle(&mut self, command: LiveSyncCommand) -> ControlFlow<()> {
        match command {
            LiveSyncCommand::Subscribe {
                project,
                connection,
            } => self.subscribe(project, connection),
            LiveSyncCommand::Unsubscribe {
                project,
                connection,
            } => self.unsubscribe(&project, connection),
            LiveSyncCommand::FilesChanged { project, paths } => {
                self.files_changed(&project, &paths)
            }
            LiveSyncCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    fn subscribe(&mut self, project: ProjectId, connection: Connection) {
        let Some(found) = self.catalog.find_project(&project) else {
            // Dropping the connection ends the stream without an acknowledgment.
            debug!("Unknown project, closing stream");
            return;
        };
        self.supervisor.ensure_watching(&project, &found.root);
        if connection.send(SyncEvent::Connected {
            project: project.clone(),
        }) {
            self.registry.add_subscriber(&project, connection);
        } else {
            debug!("Connection closed before it was registered");
            if !self.registry.is_subscribed(&project) {
                self.supervisor.stop_watching(&project);
            }
        }
    }

    fn unsubscribe(&mut self, project: &ProjectId, connection: ConnectionId) {
        match self.registry.remove_subscriber(project, connection) {
            Removal::Drained => {
                self.supervisor.stop_watching(project);
                self.notifier.cancel(project);
            }
            Removal::Remaining(_) | Removal::NotRegistered => {}
        }
    }

    fn files_changed(&mut self, project: &ProjectId, paths: &[PathBuf]) {
        if !self.supervisor.is_watching(project) {
            trace!(%project, "Ignoring change for unwatched project");
            return;
        }
        debug!(%project, changed = paths.len(), "Change recorded");
        self.notifier.notify(project, Instant::now());
    }

    fn broadcast_reload(&mut self, project: &ProjectId) {
        let event = SyncEvent::Reload {
            project: project.clone(),
            timestamp: unix_millis(),
        };
        let subscribers = self.registry.subscribers_of(project).len();
        let gone = self.registry.send_to(project, &event);
        info!(%project, subscribers, "Reload broadcast");
        for connection in gone {
            self.unsubscribe(project, connection);
        }
    }

    fn send_heartbeats(&mut self) {
        for project in self.registry.projects() {
            for connection in self.registry.send_to(&project, &SyncEvent::Heartbeat) {
                debug!(%project, %connection, "Dropping dead connection");
                self.unsubscribe(&project, connection);
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Running live-sync thread.
#[derive(Debug)]
pub struct LiveSyncThread {
    handle: LiveSyncHandle,
    join: JoinHandle<()>,
}

impl LiveSyncThread {
    pub fn handle(&self) -> LiveSyncHandle {
        self.handle.clone()
    }

    /// Block until the thread exits.
    pub fn join(self) -> LivedocResult<()> {
        self.join
            .join()
            .map_err(|_| Box::new(LivedocError::message("live-sync thread panicked")))
    }

    /// Ask the thread to stop and wait for it. Open subscriptions end.
    pub fn shutdown(self) -> LivedocResult<()> {
        self.handle.shutdown();
        self.join()
    }
}

/// Cloneable entry point used by request handlers.
#[derive(Debug, Clone)]
pub struct LiveSyncHandle {
    commands: Sender<LiveSyncCommand>,
    catalog: CatalogHandle,
}

impl LiveSyncHandle {
    /// Open a subscription to `project`.
    ///
    /// Returns `None` for an unknown project. The first event on a new
    /// subscription is [`SyncEvent::Connected`].
    pub fn subscribe(&self, project: &ProjectId) -> Option<Subscription> {
        self.catalog.find_project(project)?;
        let (sender, receiver) = mpsc::channel();
        let id = ConnectionId::new();
        self.commands
            .send(LiveSyncCommand::Subscribe {
                project: project.clone(),
                connection: Connection::new(id, sender),
            })
            .ok()?;
        Some(Subscription {
            project: project.clone(),
            id,
            receiver,
            commands: self.commands.clone(),
        })
    }

    /// Ask the live-sync thread to stop.
    pub fn shutdown(&self) {
        let _ = self.commands.send(LiveSyncCommand::Shutdown);
    }
}

/// Receiving end of one subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    project: ProjectId,
    id: ConnectionId,
    receiver: Receiver<SyncEvent>,
    commands: Sender<LiveSyncCommand>,
}

impl Subscription {
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Wait for the next event. `None` once the live-sync side has closed the stream.
    pub fn recv(&self) -> Option<SyncEvent> {
        self.receiver.recv().ok()
    }

    /// Wait at most `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SyncEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<SyncEvent, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(LiveSyncCommand::Unsubscribe {
            project: self.project.clone(),
            connection: self.id,
        });
    }
}
