//! Workspace file system watcher.
//!
//! Watches the workspace recursively and turns notify events into
//! [`FileEvent`]s delivered on a tokio channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Changed,
    Created,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Watches a directory tree for file changes
pub struct FileWatcher {
    /// Kept alive to keep watching
    _watcher: Box<dyn Watcher + Send>,
    events: UnboundedReceiver<FileEvent>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

/// Map a notify event onto file events, skipping ignored paths
fn translate(event: &Event, ignored: &[PathBuf]) -> Vec<FileEvent> {
    let kind = match event.kind {
        notify::EventKind::Create(_) => FileEventKind::Created,
        notify::EventKind::Modify(_) => FileEventKind::Changed,
        notify::EventKind::Remove(_) => FileEventKind::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|p| !p.components().any(|c| c.as_os_str() == ".git"))
        .filter(|p| !ignored.iter().any(|i| p.as_path() == i.as_path()))
        .map(|p| FileEvent {
            path: p.clone(),
            kind,
        })
        .collect()
}

fn make_event_handler(
    ignored: Vec<PathBuf>,
    tx: UnboundedSender<FileEvent>,
) -> impl Fn(std::result::Result<Event, notify::Error>) + Send + 'static {
    move |result: std::result::Result<Event, notify::Error>| match result {
        Ok(event) => {
            for file_event in translate(&event, &ignored) {
                if tx.send(file_event).is_err() {
                    tracing::trace!("file event dropped, receiver closed");
                }
            }
        }
        Err(e) => tracing::warn!("file watcher error: {}", e),
    }
}

impl FileWatcher {
    /// Watch `root` recursively.
    ///
    /// Uses the platform's native watcher and falls back to polling every
    /// 500 ms when the native backend cannot be initialised.
    pub fn new(root: &Path, ignored: Vec<PathBuf>) -> Result<Self> {
        let (tx, rx) = unbounded_channel();

        let mut watcher: Box<dyn Watcher + Send> =
            match notify::recommended_watcher(make_event_handler(ignored.clone(), tx.clone())) {
                Ok(w) => Box::new(w),
                Err(e) => {
                    tracing::warn!("native file watcher unavailable ({}), polling instead", e);
                    let config = NotifyConfig::default().with_poll_interval(Duration::from_millis(500));
                    let poll = PollWatcher::new(make_event_handler(ignored, tx), config)
                        .map_err(|e| Error::Host(format!("Failed to create file watcher: {}", e)))?;
                    Box::new(poll)
                }
            };

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| Error::Host(format!("Failed to watch {}: {}", root.display(), e)))?;

        Ok(Self {
            _watcher: watcher,
            events: rx,
        })
    }

    /// Next file event; `None` once the watcher is gone
    pub async fn next(&mut self) -> Option<FileEvent> {
        self.events.recv().await
    }
}
