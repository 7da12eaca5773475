//! Per-path event coalescing.
//!
//! Editors emit several events per save. The debouncer keeps one pending
//! event per path and releases it once no new event for that path arrived
//! during the debounce window.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::event::ChangeKind;

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Thread-safe event debouncer.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, Pending>>,
    window: Duration,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record an event, pushing the path's deadline out by one window.
    pub fn record(&self, path: PathBuf, kind: ChangeKind) {
        let mut pending = self.pending.lock().expect("debouncer lock poisoned");
        let deadline = Instant::now() + self.window;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(Pending { kind, deadline });
            }
            Entry::Occupied(mut entry) => match Self::coalesce(entry.get().kind, kind) {
                Some(kind) => {
                    *entry.get_mut() = Pending { kind, deadline };
                }
                // Created then removed within one window: nothing happened
                None => {
                    entry.remove();
                }
            },
        }
    }

    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Created, Modified, Removed};

        match (existing, new) {
            (Created, Created | Modified) => Some(Created),
            (Created, Removed) => None,
            (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified | Removed, Removed) => Some(Removed),
            (Removed, Created) => Some(Modified),
            (Removed, Modified) => Some(Removed),
        }
    }

    /// Remove and return events whose deadline has passed.
    pub fn drain_ready(&self) -> Vec<(PathBuf, ChangeKind)> {
        let mut pending = self.pending.lock().expect("debouncer lock poisoned");
        let now = Instant::now();

        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, event)| event.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|path| {
                let event = pending.remove(&path)?;
                Some((path, event.kind))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    const WINDOW: Duration = Duration::from_millis(10);

    fn settle() {
        thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn test_event_released_after_window() {
        let debouncer = EventDebouncer::new(WINDOW);
        let path = PathBuf::from("/content/posts/a.md");

        debouncer.record(path.clone(), ChangeKind::Modified);
        assert!(debouncer.drain_ready().is_empty());

        settle();
        assert_eq!(debouncer.drain_ready(), vec![(path, ChangeKind::Modified)]);
        assert!(debouncer.drain_ready().is_empty());
    }

    #[test]
    fn test_burst_of_saves_is_one_event() {
        let debouncer = EventDebouncer::new(WINDOW);
        let path = PathBuf::from("/content/posts/a.md");

        for _ in 0..5 {
            debouncer.record(path.clone(), ChangeKind::Modified);
        }

        settle();
        assert_eq!(debouncer.drain_ready().len(), 1);
    }

    #[test]
    fn test_created_then_removed_vanishes() {
        let debouncer = EventDebouncer::new(WINDOW);
        let path = PathBuf::from("/content/posts/.a.md.swp");

        debouncer.record(path.clone(), ChangeKind::Created);
        debouncer.record(path, ChangeKind::Removed);

        settle();
        assert!(debouncer.drain_ready().is_empty());
    }

    #[test]
    fn test_paths_are_independent() {
        let debouncer = EventDebouncer::new(WINDOW);

        debouncer.record(PathBuf::from("/content/a.md"), ChangeKind::Modified);
        debouncer.record(PathBuf::from("/content/b.md"), ChangeKind::Created);

        settle();
        assert_eq!(debouncer.drain_ready().len(), 2);
    }

    #[test]
    fn test_coalesce_table() {
        use ChangeKind::{Created, Modified, Removed};

        assert_eq!(EventDebouncer::coalesce(Created, Modified), Some(Created));
        assert_eq!(EventDebouncer::coalesce(Created, Removed), None);
        assert_eq!(EventDebouncer::coalesce(Modified, Created), Some(Created));
        assert_eq!(EventDebouncer::coalesce(Modified, Removed), Some(Removed));
        assert_eq!(EventDebouncer::coalesce(Removed, Created), Some(Modified));
        assert_eq!(EventDebouncer::coalesce(Removed, Modified), Some(Removed));
    }
}
