use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;

use tracing::{debug, info, warn};

use livedoc_base::{FileChangeEvent, PalHandle, WatchHandle};

use crate::config::ProjectId;
use crate::scanner::{is_excluded, is_markdown};

use super::hub::LiveSyncCommand;

/* 📖 # Why does a failed watch leave no trace?

Registering a watch can fail for reasons outside our control: the root was
deleted, permissions changed, the OS ran out of watch descriptors. The
subscriber is still a valid subscriber, it just will not see reloads. So the
failure is logged and nothing is stored; the project counts as unwatched and
the next subscriber to arrive tries again.
*/

/// Owns at most one directory watch per subscribed project.
#[derive(Debug)]
pub struct WatchSupervisor {
    pal: PalHandle,
    commands: Sender<LiveSyncCommand>,
    watches: HashMap<ProjectId, WatchHandle>,
}

impl WatchSupervisor {
    /// Change events are forwarded to `commands` as [`LiveSyncCommand::FilesChanged`].
    pub fn new(pal: PalHandle, commands: Sender<LiveSyncCommand>) -> Self {
        Self {
            pal,
            commands,
            watches: HashMap::new(),
        }
    }

    /// Start watching `root` for `project` unless a watch already exists.
    ///
    /// Returns whether the project is watched afterwards.
    pub fn ensure_watching(&mut self, project: &ProjectId, root: &Path) -> bool {
        if self.watches.contains_key(project) {
            return true;
        }

        let commands = self.commands.clone();
        let callback_project = project.clone();
        let callback_root = root.to_path_buf();
        let callback = Box::new(move |event: FileChangeEvent| {
            let paths: Vec<PathBuf> = event
                .changed_files
                .into_iter()
                .filter(|path| is_visible_change(&callback_root, path))
                .collect();
            if paths.is_empty() {
                return;
            }
            // The hub is gone during shutdown; nothing left to notify.
            let _ = commands.send(LiveSyncCommand::FilesChanged {
                project: callback_project.clone(),
                paths,
            });
        });

        match self.pal.watch_directory(root, callback) {
            Ok(handle) => {
                info!(%project, root = %root.display(), "Watching project");
                self.watches.insert(project.clone(), handle);
                true
            }
            Err(error) => {
                warn!(
                    %project,
                    root = %root.display(),
                    %error,
                    "Failed to watch project, live reload disabled"
                );
                false
            }
        }
    }

    /// Drop the watch for `project`. Returns whether one existed.
    pub fn stop_watching(&mut self, project: &ProjectId) -> bool {
        match self.watches.remove(project) {
            Some(handle) => {
                info!(%project, root = %handle.root().display(), "Stopped watching project");
                true
            }
            None => {
                debug!(%project, "No watch to stop");
                false
            }
        }
    }

    pub fn is_watching(&self, project: &ProjectId) -> bool {
        self.watches.contains_key(project)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }
}

/// A Markdown file that a scan of `root` could list.
///
/// Paths the OS reports outside `root` (e.g. through a symlinked root) are
/// only checked for the extension.
fn is_visible_change(root: &Path, path: &Path) -> bool {
    if !is_markdown(path) {
        return false;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    !relative.components().any(|component| match component {
        Component::Normal(name) => is_excluded(&name.to_string_lossy()),
        _ => false,
    })
}
