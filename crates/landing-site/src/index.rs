//! Content index snapshots.
//!
//! An [`EntriesIndex`] is an immutable snapshot of every entry plus the
//! derived views templates and the router need:
//!
//! - `entries`: visible entries, newest first
//! - `by_permalink`: canonical permalink to entry (hidden entries included)
//! - `by_category`: visible entries per `posts`, `pages` or collection
//! - `by_tag`: visible entries per tag
//! - `dynamic`: entries whose permalink has placeholders, in index order

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use landing_storage::list_files;
use landing_template::Map;
use tracing::warn;

use crate::entry::Entry;
use crate::error::SiteError;
use crate::permalink::canonicalize;

/// Extensions indexed as content.
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown", "html", "xml"];

/// Index every content file under `roots` into `category`.
///
/// # Errors
///
/// Fails on the first file that cannot be read or parsed.
pub fn index_dir(roots: &[PathBuf], category: &str) -> Result<Vec<Entry>, SiteError> {
    list_files(roots, CONTENT_EXTENSIONS)?
        .iter()
        .map(|path| Entry::load(path, category))
        .collect()
}

/// An entry matched by a request path, with bound permalink parameters.
#[derive(Debug)]
pub struct Resolved {
    pub entry: Arc<Entry>,
    pub params: Map,
}

/// Immutable snapshot of the content index.
#[derive(Debug, Default)]
pub struct EntriesIndex {
    all: Vec<Arc<Entry>>,
    entries: Vec<Arc<Entry>>,
    by_permalink: HashMap<String, usize>,
    by_category: BTreeMap<String, Vec<Arc<Entry>>>,
    by_tag: BTreeMap<String, Vec<Arc<Entry>>>,
    dynamic: Vec<usize>,
}

impl EntriesIndex {
    /// Build the derived views over `all`, in index order.
    ///
    /// When two entries share a permalink the later one wins and a warning
    /// is logged.
    #[must_use]
    pub fn new(all: Vec<Entry>) -> Self {
        let all: Vec<Arc<Entry>> = all.into_iter().map(Arc::new).collect();

        let mut by_permalink = HashMap::with_capacity(all.len());
        let mut dynamic = Vec::new();
        for (i, entry) in all.iter().enumerate() {
            if let Some(previous) = by_permalink.insert(entry.permalink().to_owned(), i) {
                warn!(
                    permalink = entry.permalink(),
                    kept = %entry.file().path().display(),
                    replaced = %all[previous].file().path().display(),
                    "Duplicate permalink"
                );
            }
            if entry.is_dynamic() {
                dynamic.push(i);
            }
        }

        let mut entries: Vec<Arc<Entry>> =
            all.iter().filter(|e| !e.is_hidden()).map(Arc::clone).collect();
        entries.sort_by(|a, b| b.date().cmp(&a.date()));

        let mut by_category: BTreeMap<String, Vec<Arc<Entry>>> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, Vec<Arc<Entry>>> = BTreeMap::new();
        for entry in &entries {
            by_category
                .entry(entry.category().to_owned())
                .or_default()
                .push(Arc::clone(entry));
            for tag in entry.tags() {
                by_tag.entry(tag.clone()).or_default().push(Arc::clone(entry));
            }
        }

        Self {
            all,
            entries,
            by_permalink,
            by_category,
            by_tag,
            dynamic,
        }
    }

    /// Every indexed entry in index order, hidden ones included.
    #[must_use]
    pub fn all(&self) -> &[Arc<Entry>] {
        &self.all
    }

    /// Visible entries, newest first.
    #[must_use]
    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Visible entries of one category, newest first.
    #[must_use]
    pub fn category(&self, name: &str) -> &[Arc<Entry>] {
        self.by_category.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn categories(&self) -> &BTreeMap<String, Vec<Arc<Entry>>> {
        &self.by_category
    }

    /// Visible entries carrying `tag`, newest first.
    #[must_use]
    pub fn tagged(&self, tag: &str) -> &[Arc<Entry>] {
        self.by_tag.get(tag).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, Vec<Arc<Entry>>> {
        &self.by_tag
    }

    /// Exact lookup by permalink.
    #[must_use]
    pub fn get(&self, permalink: &str) -> Option<&Arc<Entry>> {
        self.by_permalink
            .get(&canonicalize(permalink))
            .map(|&i| &self.all[i])
    }

    /// Find the entry serving `path`.
    ///
    /// Exact permalinks win; otherwise dynamic entries are tried in index
    /// order and the first matching pattern binds its parameters.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Resolved> {
        let path = canonicalize(path);
        if let Some(entry) = self.get(&path) {
            let params = entry
                .pattern()
                .and_then(|p| p.params(&path))
                .unwrap_or_default();
            return Some(Resolved {
                entry: Arc::clone(entry),
                params,
            });
        }
        self.dynamic.iter().find_map(|&i| {
            let entry = &self.all[i];
            let params = entry.pattern()?.params(&path)?;
            Some(Resolved {
                entry: Arc::clone(entry),
                params,
            })
        })
    }

    /// Latest date over visible entries, optionally of one category.
    #[must_use]
    pub fn last_update(&self, category: Option<&str>) -> Option<DateTime<Utc>> {
        let entries = match category {
            Some(name) => self.category(name),
            None => self.entries(),
        };
        entries.iter().map(|e| e.date()).max()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use landing_storage::FrontMatterFile;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn entry(name: &str, category: &str, text: &str) -> Entry {
        let file = FrontMatterFile::from_text(&PathBuf::from(name), text.to_owned()).unwrap();
        Entry::from_file(file, category).unwrap()
    }

    fn titles(entries: &[Arc<Entry>]) -> Vec<&str> {
        entries.iter().map(|e| e.title()).collect()
    }

    fn sample() -> EntriesIndex {
        EntriesIndex::new(vec![
            entry("2020-01-01-old.md", "posts", "---\ntitle: Old\ntags: [rust]\n---\n"),
            entry("2021-01-01-new.md", "posts", "---\ntitle: New\ntags: [rust, web]\n---\n"),
            entry("2022-01-01-draft.md", "posts", "---\ntitle: Draft\nhidden: true\n---\n"),
            entry("about.html", "pages", "---\ntitle: About\n---\n"),
            entry("talk.md", "talks", "---\ntitle: Talk\ndate: 2019-05-05\n---\n"),
            entry(
                "blog.html",
                "pages",
                "---\ntitle: Blog\npermalink: /blog/{n}\n---\n",
            ),
            entry(
                "tag.html",
                "pages",
                "---\ntitle: Tag\npermalink: /tag/{name}\n---\n",
            ),
        ])
    }

    #[test]
    fn test_hidden_entries_are_only_in_all() {
        let index = sample();

        assert_eq!(index.len(), 7);
        assert!(!titles(index.entries()).contains(&"Draft"));
        assert!(titles(index.all()).contains(&"Draft"));
        assert!(index.get("/draft").is_some());
    }

    #[test]
    fn test_entries_are_newest_first() {
        let index = sample();
        assert_eq!(titles(index.category("posts")), ["New", "Old"]);
        assert_eq!(index.entries().first().unwrap().title(), "New");
    }

    #[test]
    fn test_categories_and_tags() {
        let index = sample();

        assert_eq!(titles(index.category("talks")), ["Talk"]);
        assert!(index.category("missing").is_empty());
        assert_eq!(titles(index.tagged("rust")), ["New", "Old"]);
        assert_eq!(titles(index.tagged("web")), ["New"]);
    }

    #[test]
    fn test_resolve_exact_then_dynamic() {
        let index = sample();

        let about = index.resolve("/about/").unwrap();
        assert_eq!(about.entry.title(), "About");
        assert!(about.params.is_empty());

        let page = index.resolve("/blog/2").unwrap();
        assert_eq!(page.entry.title(), "Blog");
        assert_eq!(page.params.get("n").unwrap().to_int(), 2);

        let tag = index.resolve("/tag/rust").unwrap();
        assert_eq!(tag.params.get("name").unwrap().to_string(), "rust");

        assert!(index.resolve("/blog/two").is_none());
        assert!(index.resolve("/nothing").is_none());
    }

    #[test]
    fn test_duplicate_permalink_last_wins() {
        let index = EntriesIndex::new(vec![
            entry("a.md", "pages", "---\ntitle: First\npermalink: /same\n---\n"),
            entry("b.md", "pages", "---\ntitle: Second\npermalink: /same\n---\n"),
        ]);

        assert_eq!(index.get("/same").unwrap().title(), "Second");
        assert_eq!(index.entries().len(), 2);
    }

    #[test]
    fn test_last_update() {
        let index = sample();

        let latest = index.last_update(None).unwrap();
        assert_eq!(latest.format("%Y").to_string(), "2021");
        let pages = index.last_update(Some("talks")).unwrap();
        assert_eq!(pages.format("%Y").to_string(), "2019");
        assert!(EntriesIndex::default().last_update(None).is_none());
    }

    #[test]
    fn test_index_dir_reads_supported_extensions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "A").unwrap();
        std::fs::write(dir.path().join("b.html"), "B").unwrap();
        std::fs::write(dir.path().join("c.txt"), "C").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/d.xml"), "D").unwrap();

        let entries = index_dir(&[dir.path().to_path_buf()], "pages").unwrap();

        let mut names: Vec<&str> = entries.iter().map(|e| e.title()).collect();
        names.sort_unstable();
        assert_eq!(names, ["a", "b", "d"]);
        assert!(entries.iter().all(|e| e.category() == "pages"));
    }

    #[test]
    fn test_index_dir_fails_on_bad_front_matter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.md"), "---\n: [\n---\nbody").unwrap();

        assert!(index_dir(&[dir.path().to_path_buf()], "pages").is_err());
    }
}
