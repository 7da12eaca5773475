//! Change notification types returned by [`watch`](crate::watch).

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

/// Kind of content change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A debounced change to one path under the content root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path relative to the watched root.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Receiver for change events.
pub struct ChangeReceiver {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl ChangeReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` when the watcher is gone.
    #[must_use]
    pub fn recv(&self) -> Option<ChangeEvent> {
        self.rx.recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take every event already queued without blocking.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.rx.try_iter().collect()
    }
}

/// Handle that keeps a watcher running.
///
/// Dropping the handle stops watching.
pub struct WatchHandle {
    _shutdown: Option<mpsc::Sender<()>>,
}

impl WatchHandle {
    pub(crate) fn new(shutdown: mpsc::Sender<()>) -> Self {
        Self {
            _shutdown: Some(shutdown),
        }
    }

    /// Stop watching immediately.
    pub fn stop(mut self) {
        self._shutdown.take();
    }
}
