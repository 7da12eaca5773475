//! Recursive filesystem watcher for the content root.

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};

use crate::debouncer::EventDebouncer;
use crate::error::{StorageError, StorageErrorKind};
use crate::event::{ChangeEvent, ChangeKind, ChangeReceiver, WatchHandle};

/// How often the drain thread checks for settled events.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Watch `root` recursively.
///
/// Paths with a component equal to one of `ignore` (for example `.cache`)
/// never produce events. Bursts on the same path are coalesced over
/// `debounce`. Events carry paths relative to `root`.
///
/// # Errors
///
/// Returns [`StorageErrorKind::Watch`] if the platform watcher cannot be
/// created or attached to `root`.
pub fn watch(
    root: &Path,
    ignore: &[String],
    debounce: Duration,
) -> Result<(ChangeReceiver, WatchHandle), StorageError> {
    let (event_tx, event_rx) = mpsc::channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let debouncer = Arc::new(EventDebouncer::new(debounce));

    let watched_root = root.to_path_buf();
    let ignore = ignore.to_vec();
    let recorder = Arc::clone(&debouncer);

    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "watch error");
                    return;
                }
            };
            let kind = match event.kind {
                notify::EventKind::Create(_) => ChangeKind::Created,
                notify::EventKind::Modify(_) => ChangeKind::Modified,
                notify::EventKind::Remove(_) => ChangeKind::Removed,
                _ => return,
            };
            for path in event.paths {
                let Ok(relative) = path.strip_prefix(&watched_root) else {
                    continue;
                };
                if is_ignored(relative, &ignore) {
                    continue;
                }
                recorder.record(relative.to_path_buf(), kind);
            }
        })
        .map_err(|e| watch_error(root, e))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| watch_error(root, e))?;

    let watcher = Arc::new(Mutex::new(watcher));

    std::thread::spawn(move || {
        let _watcher_guard = watcher;

        loop {
            match shutdown_rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }

            for (path, kind) in debouncer.drain_ready() {
                tracing::debug!(path = %path.display(), ?kind, "content changed");
                if event_tx.send(ChangeEvent { path, kind }).is_err() {
                    return;
                }
            }
        }
    });

    Ok((ChangeReceiver::new(event_rx), WatchHandle::new(shutdown_tx)))
}

/// Whether any component of `relative` is an ignored name.
pub(crate) fn is_ignored(relative: &Path, ignore: &[String]) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => ignore.iter().any(|i| name == i.as_str()),
        _ => false,
    })
}

fn watch_error(root: &Path, e: notify::Error) -> StorageError {
    StorageError::new(StorageErrorKind::Watch)
        .with_path(PathBuf::from(root))
        .with_source(e)
}
