//! Entry store: the current index snapshot with lazy rebuilds.
//!
//! # Thread Safety
//!
//! - `snapshot()` uses double-checked locking so concurrent readers during
//!   an invalidated state wait for a single rebuild
//! - `invalidate()` is lock-free: it bumps a generation counter
//! - a snapshot is only current for the generation read before its scan
//!   started, so an invalidation that lands mid-build forces another build
//! - readers keep the `Arc<EntriesIndex>` they got; a rebuild swaps the
//!   pointer and never mutates a published snapshot

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use landing_storage::Folders;
use tracing::{info, warn};

use crate::error::SiteError;
use crate::index::{EntriesIndex, index_dir};

/// Owner of the current [`EntriesIndex`].
pub struct Entries {
    folders: Folders,
    current: RwLock<Option<Arc<EntriesIndex>>>,
    /// Bumped by every invalidation.
    generation: AtomicU64,
    /// Generation the current snapshot was built for.
    built: AtomicU64,
    reload_lock: Mutex<()>,
}

impl Entries {
    /// Create a store over `folders`. Nothing is indexed until the first
    /// [`Entries::snapshot`].
    #[must_use]
    pub fn new(folders: Folders) -> Self {
        Self {
            folders,
            current: RwLock::new(None),
            generation: AtomicU64::new(1),
            built: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
        }
    }

    /// Current snapshot, rebuilding it first if it was invalidated.
    ///
    /// A failed rebuild keeps serving the previous snapshot when there is
    /// one; the failure is logged and retried after the next invalidation.
    ///
    /// # Errors
    ///
    /// Returns the build error when no snapshot has ever been built.
    pub fn snapshot(&self) -> Result<Arc<EntriesIndex>, SiteError> {
        if let Some(index) = self.fresh() {
            return Ok(index);
        }

        let _guard = self.reload_lock.lock().expect("entries reload lock poisoned");

        if let Some(index) = self.fresh() {
            return Ok(index);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let result = self.build();
        self.publish(generation, result)
    }

    /// Mark the snapshot stale. The next [`Entries::snapshot`] rebuilds,
    /// even when a build is already running.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// The current snapshot if no invalidation happened since its build.
    fn fresh(&self) -> Option<Arc<EntriesIndex>> {
        let current = self.built.load(Ordering::Acquire) == self.generation.load(Ordering::Acquire);
        if current { self.current() } else { None }
    }

    /// Store the outcome of a build that started at `generation`.
    fn publish(
        &self,
        generation: u64,
        result: Result<EntriesIndex, SiteError>,
    ) -> Result<Arc<EntriesIndex>, SiteError> {
        match result {
            Ok(index) => {
                let index = Arc::new(index);
                *self.current.write().expect("entries lock poisoned") = Some(Arc::clone(&index));
                self.built.store(generation, Ordering::Release);
                Ok(index)
            }
            Err(e) => match self.current() {
                Some(previous) => {
                    warn!(error = %e, "Index rebuild failed, keeping previous entries");
                    self.built.store(generation, Ordering::Release);
                    Ok(previous)
                }
                None => Err(e),
            },
        }
    }

    fn current(&self) -> Option<Arc<EntriesIndex>> {
        self.current.read().expect("entries lock poisoned").clone()
    }

    fn build(&self) -> Result<EntriesIndex, SiteError> {
        let start = Instant::now();

        let mut all = index_dir(&self.folders.posts(), "posts")?;
        all.extend(index_dir(&self.folders.pages(), "pages")?);
        for (name, dir) in self.folders.collections()? {
            all.extend(index_dir(&[dir], &name)?);
        }

        let index = EntriesIndex::new(all);
        info!(
            entries = index.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Indexed content"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    static_assertions::assert_impl_all!(Entries: Send, Sync);

    fn content() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("posts")).unwrap();
        fs::create_dir_all(dir.path().join("_pages")).unwrap();
        fs::create_dir_all(dir.path().join("collections/talks")).unwrap();
        fs::write(dir.path().join("posts/2020-01-01-first.md"), "First").unwrap();
        fs::write(dir.path().join("_pages/about.html"), "About").unwrap();
        fs::write(dir.path().join("collections/talks/intro.md"), "Talk").unwrap();
        dir
    }

    #[test]
    fn test_snapshot_indexes_every_category() {
        let dir = content();
        let entries = Entries::new(Folders::new(dir.path()));

        let index = entries.snapshot().unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.category("posts").len(), 1);
        assert_eq!(index.category("pages").len(), 1);
        assert_eq!(index.category("talks").len(), 1);
    }

    #[test]
    fn test_snapshot_is_reused_until_invalidated() {
        let dir = content();
        let entries = Entries::new(Folders::new(dir.path()));

        let first = entries.snapshot().unwrap();
        fs::write(dir.path().join("posts/2020-02-02-second.md"), "Second").unwrap();
        let second = entries.snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        entries.invalidate();
        let third = entries.snapshot().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.get("/second").is_some());
    }

    #[test]
    fn test_invalidate_during_build_is_not_lost() {
        let dir = content();
        let entries = Entries::new(Folders::new(dir.path()));

        // A build scans the tree, then a file changes and is invalidated
        // before that build publishes.
        let generation = entries.generation.load(Ordering::Acquire);
        let scanned = entries.build();
        fs::write(dir.path().join("posts/2020-03-03-late.md"), "Late").unwrap();
        entries.invalidate();
        let published = entries.publish(generation, scanned).unwrap();
        assert!(published.get("/late").is_none());

        let next = entries.snapshot().unwrap();
        assert!(!Arc::ptr_eq(&published, &next));
        assert!(next.get("/late").is_some());
        assert!(Arc::ptr_eq(&next, &entries.snapshot().unwrap()));
    }

    #[test]
    fn test_invalidate_racing_a_reader_thread() {
        let dir = content();
        for i in 0..500 {
            fs::write(dir.path().join(format!("posts/2020-01-01-p{i}.md")), "x").unwrap();
        }
        let entries = Arc::new(Entries::new(Folders::new(dir.path())));

        let reader = {
            let entries = Arc::clone(&entries);
            thread::spawn(move || entries.snapshot().unwrap())
        };
        fs::write(dir.path().join("posts/2020-04-04-new.md"), "New").unwrap();
        entries.invalidate();
        reader.join().unwrap();

        assert!(entries.snapshot().unwrap().get("/new").is_some());
    }

    #[test]
    fn test_removed_files_disappear_after_invalidate() {
        let dir = content();
        let entries = Entries::new(Folders::new(dir.path()));
        assert!(entries.snapshot().unwrap().get("/about").is_some());

        fs::remove_file(dir.path().join("_pages/about.html")).unwrap();
        entries.invalidate();

        assert!(entries.snapshot().unwrap().get("/about").is_none());
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_snapshot() {
        let dir = content();
        let entries = Entries::new(Folders::new(dir.path()));
        let before = entries.snapshot().unwrap();

        fs::write(dir.path().join("posts/bad.md"), "---\n: [\n---\n").unwrap();
        entries.invalidate();
        let after = entries.snapshot().unwrap();

        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_first_build_failure_is_an_error() {
        let dir = content();
        fs::write(dir.path().join("posts/bad.md"), "---\n: [\n---\n").unwrap();
        let entries = Entries::new(Folders::new(dir.path()));

        assert!(entries.snapshot().is_err());
    }

    #[test]
    fn test_concurrent_readers_share_one_build() {
        let dir = content();
        let entries = Arc::new(Entries::new(Folders::new(dir.path())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let entries = Arc::clone(&entries);
                thread::spawn(move || entries.snapshot().unwrap())
            })
            .collect();
        let snapshots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(snapshots.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
