//! Rendering orchestrator.
//!
//! [`LandingServing`] owns every site service: the entry store, the site
//! configuration, the persistent cache and the template engine with the site
//! extensions registered. A render resolves the permalink, publishes a
//! [`PageShown`] event, assembles the scope, renders through the entry's
//! layouts and finally applies sponsor gating to the text.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use landing_cache::Cache;
use landing_storage::Folders;
use landing_template::{
    DirProvider, Flow, Map, Registry, TemplateError, TemplateProvider, TemplateSource, Templates,
    Value,
};
use tracing::{debug, info, warn};

use crate::config::SiteConfigService;
use crate::entry::Entry;
use crate::error::SiteError;
use crate::extensions::{self, Services};
use crate::feed::atom_feed;
use crate::gating::apply_gate;
use crate::index::{EntriesIndex, Resolved};
use crate::request::{REQUEST_VAR, RequestInfo};
use crate::session::{AnonymousSession, PageShown, PageShownListener};
use crate::store::Entries;
use crate::youtube::YoutubeService;

/// Permalink of the custom not-found page.
pub const NOT_FOUND_PERMALINK: &str = "/404";

/// Body used when the site has no working not-found page.
pub const NOT_FOUND_BODY: &str = "Not Found";

/// Tag views exposed on `site`, as (scope key, tag).
const TAG_VIEWS: [(&str, &str); 4] = [
    ("social_coding", "social-coding"),
    ("articles", "article"),
    ("releases", "release"),
    ("life_lessons", "life-lessons"),
];

/// Kind of document a page renders to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageType {
    Html,
    Xml,
}

impl PageType {
    #[must_use]
    pub fn of(entry: &Entry) -> Self {
        if entry.file().is_xml() {
            Self::Xml
        } else {
            Self::Html
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Xml => "application/xml; charset=utf-8",
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
        }
    }
}

/// A rendered page.
#[derive(Debug)]
pub struct Rendered {
    pub body: String,
    pub page_type: PageType,
    pub status: u16,
    /// Scope the page was rendered with.
    pub scope: Map,
}

impl Rendered {
    fn not_found() -> Self {
        Self {
            body: NOT_FOUND_BODY.to_owned(),
            page_type: PageType::Html,
            status: 404,
            scope: Map::new(),
        }
    }
}

/// Root templates: entry files looked up by permalink.
struct EntryProvider {
    entries: Arc<Entries>,
}

impl TemplateProvider for EntryProvider {
    fn get(&self, name: &str) -> Result<Option<TemplateSource>, TemplateError> {
        let index = self
            .entries
            .snapshot()
            .map_err(|e| TemplateError::Eval(e.to_string()))?;
        Ok(index.get(name).map(|entry| entry.template_source()))
    }
}

/// The site: content, configuration and rendering.
pub struct LandingServing {
    folders: Folders,
    entries: Arc<Entries>,
    config: Arc<SiteConfigService>,
    cache: Arc<dyn Cache>,
    templates: Templates,
    listeners: Vec<Arc<dyn PageShownListener>>,
    reload_enabled: AtomicBool,
}

impl LandingServing {
    /// Open the site rooted at `folders`.
    ///
    /// Entries are indexed lazily on first use; the site configuration is
    /// read immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the site configuration cannot be read.
    pub fn new(folders: Folders, cache: Arc<dyn Cache>) -> Result<Self, SiteError> {
        let entries = Arc::new(Entries::new(folders.clone()));
        let config = Arc::new(SiteConfigService::load(folders.clone())?);
        let services = Arc::new(Services {
            folders: folders.clone(),
            entries: Arc::clone(&entries),
            cache: Arc::clone(&cache),
            youtube: YoutubeService::new(Arc::clone(&cache), Arc::clone(&config)),
        });
        let registry = extensions::register(Registry::with_builtins(), &services);
        let templates = Templates::new(
            Arc::new(EntryProvider {
                entries: Arc::clone(&entries),
            }),
            Arc::new(DirProvider::new(folders.includes())),
            Arc::new(DirProvider::new(folders.layouts())),
            registry,
        );

        Ok(Self {
            folders,
            entries,
            config,
            cache,
            templates,
            listeners: vec![Arc::new(AnonymousSession)],
            reload_enabled: AtomicBool::new(true),
        })
    }

    /// Add a listener notified before every successful render.
    #[must_use]
    pub fn with_listener(mut self, listener: impl PageShownListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    #[must_use]
    pub fn folders(&self) -> &Folders {
        &self.folders
    }

    #[must_use]
    pub fn config(&self) -> &SiteConfigService {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub(crate) fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Current entry snapshot, rebuilt if invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be indexed and no previous
    /// snapshot exists.
    pub fn entries(&self) -> Result<Arc<EntriesIndex>, SiteError> {
        self.entries.snapshot()
    }

    #[must_use]
    pub fn reload_enabled(&self) -> bool {
        self.reload_enabled.load(Ordering::Acquire)
    }

    /// Turn change-triggered reloads on or off.
    pub fn set_reload_enabled(&self, enabled: bool) {
        self.reload_enabled.store(enabled, Ordering::Release);
    }

    /// Drop the entry snapshot and compiled templates and re-read the site
    /// configuration.
    ///
    /// A configuration that fails to load is logged and the previous one
    /// kept.
    pub fn reload(&self) {
        let started = Instant::now();
        self.entries.invalidate();
        self.templates.invalidate_cache();
        if let Err(e) = self.config.reload() {
            warn!(error = %e, "Site configuration reload failed");
        }
        info!(elapsed_ms = started.elapsed().as_millis(), "Site reloaded");
    }

    /// The `site` scope value.
    fn site_scope(&self, index: &EntriesIndex) -> Map {
        let list = |entries: &[Arc<Entry>]| -> Value { entries.iter().map(Entry::to_value).collect() };
        let grouped = |groups: &BTreeMap<String, Vec<Arc<Entry>>>| -> Value {
            Value::from(
                groups
                    .iter()
                    .map(|(name, entries)| (name.clone(), list(entries)))
                    .collect::<Map>(),
            )
        };

        let config = self.config.config();
        let mut site = config.as_ref().clone();
        let collections = grouped(index.categories());
        site.insert("config".to_owned(), Value::Map(config));
        site.insert("data".to_owned(), Value::Map(self.config.data()));
        site.insert("collections".to_owned(), collections.clone());
        site.insert("entries_by_category".to_owned(), collections);
        site.insert("posts".to_owned(), list(index.category("posts")));
        site.insert("pages".to_owned(), list(index.category("pages")));
        site.insert("entries".to_owned(), list(index.entries()));
        site.insert("tags".to_owned(), grouped(index.tags()));
        for (key, tag) in TAG_VIEWS {
            site.insert(key.to_owned(), list(index.tagged(tag)));
        }
        site.insert("last_update".to_owned(), Value::from(index.last_update(None)));
        site
    }

    /// Render scope for `entry`. Later layers win on key collisions: site
    /// config, request and page bindings, config extras, listener extras.
    pub(crate) fn scope(
        &self,
        index: &EntriesIndex,
        request: &RequestInfo,
        entry: Option<&Arc<Entry>>,
        params: Map,
        extra: Map,
    ) -> Map {
        let mut scope = self.config.config().as_ref().clone();
        scope.insert(REQUEST_VAR.to_owned(), request.to_value());
        scope.insert("site".to_owned(), Value::from(self.site_scope(index)));
        scope.insert("params".to_owned(), Value::from(params));
        if let Some(entry) = entry {
            scope.insert("page".to_owned(), entry.to_value());
        }
        scope.extend(self.config.extra());
        scope.extend(extra);
        scope
    }

    /// Render the page at `permalink`.
    ///
    /// Listeners are notified only for statuses below 400.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Halt`] when no entry matches or the template
    /// stops the render, and any indexing or template error.
    pub fn generate(
        &self,
        permalink: &str,
        request: &RequestInfo,
        status: u16,
    ) -> Result<Rendered, SiteError> {
        let index = self.entries.snapshot()?;
        let Resolved { entry, params } = index
            .resolve(permalink)
            .ok_or(SiteError::Halt(Flow::NotFound))?;

        let mut shown = PageShown::new(request, Some(&entry), permalink);
        if status < 400 {
            for listener in &self.listeners {
                listener.page_shown(&mut shown);
            }
        }
        let PageShown {
            is_sponsor, extra, ..
        } = shown;

        let scope = self.scope(&index, request, Some(&entry), params, extra);
        let body = self.templates.render(entry.permalink(), scope.clone())?;
        debug!(permalink, entry = entry.permalink(), status, "Rendered page");

        Ok(Rendered {
            body: apply_gate(&body, is_sponsor),
            page_type: PageType::of(&entry),
            status,
            scope,
        })
    }

    /// Render the not-found page with status 404.
    ///
    /// Falls back to a plain body when the site has no `/404` entry or it
    /// fails to render.
    pub fn not_found(&self, request: &RequestInfo) -> Rendered {
        match self.generate(NOT_FOUND_PERMALINK, request, 404) {
            Ok(page) => page,
            Err(e) => {
                if e.flow().is_none() {
                    warn!(error = %e, "Not-found page failed to render");
                }
                Rendered::not_found()
            }
        }
    }

    /// The Atom feed of the newest entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be indexed or the feed
    /// cannot be serialized.
    pub fn feed(&self, request: &RequestInfo) -> Result<String, SiteError> {
        let index = self.entries.snapshot()?;
        atom_feed(&index, &self.config.config(), request)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use landing_cache::NullCache;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    static_assertions::assert_impl_all!(LandingServing: Send, Sync);

    fn write(root: &Path, name: &str, text: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn site() -> (TempDir, LandingServing) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "config.yml", "title: My Site\nowner: me\n");
        write(root, "data/authors.yml", "- name: Ann\n");
        write(root, "layouts/default.html", "<main>{{ content }}</main>");
        write(
            root,
            "posts/2021-05-01-first.md",
            "---\ntitle: First\ntags: [article]\nlayout: default\n---\n# {{ page.title }} on {{ site.title }}\n",
        );
        write(root, "posts/2021-06-01-second.md", "---\ntitle: Second\n---\nBody");
        write(
            root,
            "pages/index.html",
            "---\npermalink: /\n---\n{% for p in site.posts %}{{ p.title }};{% endfor %}",
        );
        write(root, "pages/tag.html", "---\npermalink: /tag/{name}\n---\nTag {{ params.name }}");
        write(root, "pages/feed.xml", "---\npermalink: /sitemap.xml\n---\n<urlset/>");
        write(
            root,
            "pages/gated.html",
            "$SPONSOR$:paid$$$NOSPONSOR$:free$$ {{ session.price }}",
        );
        write(root, "pages/moved.html", "{{ permanent_redirect('/new') }}");
        let serving = LandingServing::new(Folders::new(root), Arc::new(NullCache)).unwrap();
        (dir, serving)
    }

    fn render(serving: &LandingServing, permalink: &str) -> Rendered {
        serving.generate(permalink, &RequestInfo::default(), 200).unwrap()
    }

    #[test]
    fn test_renders_markdown_through_layout() {
        let (_dir, serving) = site();

        let page = render(&serving, "/first");

        assert!(page.body.starts_with("<main><h1>First on My Site</h1>"));
        assert!(page.body.trim_end().ends_with("</main>"));
        assert_eq!(page.page_type, PageType::Html);
        assert_eq!(page.status, 200);
    }

    #[test]
    fn test_scope_exposes_site_views() {
        let (_dir, serving) = site();

        let page = render(&serving, "/");

        assert_eq!(page.body.trim(), "Second;First;");
        let site = page.scope.get("site").unwrap();
        assert_eq!(site.attr("articles").len(), 1);
        assert_eq!(site.attr("collections").attr("posts").len(), 2);
        assert_eq!(site.attr("data").attr("authors").len(), 1);
        assert_eq!(page.scope.get("owner").unwrap().to_string(), "me");
    }

    #[test]
    fn test_dynamic_permalink_params() {
        let (_dir, serving) = site();
        assert_eq!(render(&serving, "/tag/rust/").body.trim(), "Tag rust");
    }

    #[test]
    fn test_xml_page_type() {
        let (_dir, serving) = site();
        assert_eq!(render(&serving, "/sitemap.xml").page_type, PageType::Xml);
    }

    #[test]
    fn test_anonymous_session_and_gating() {
        let (_dir, serving) = site();
        assert_eq!(render(&serving, "/gated").body.trim(), "free 0");
    }

    struct Sponsor;

    impl PageShownListener for Sponsor {
        fn page_shown(&self, page: &mut PageShown<'_>) {
            page.is_sponsor = true;
            page.extra.insert(
                "session".to_owned(),
                Value::from(Map::from([("price".to_owned(), Value::Int(5))])),
            );
        }
    }

    #[test]
    fn test_listener_marks_sponsor() {
        let (_dir, serving) = site();
        let serving = serving.with_listener(Sponsor);

        assert_eq!(render(&serving, "/gated").body.trim(), "paid 5");
        let page = serving.generate("/gated", &RequestInfo::default(), 404).unwrap();
        assert_eq!(page.body.trim(), "free");
    }

    #[test]
    fn test_missing_and_redirect_halts() {
        let (_dir, serving) = site();

        let err = serving.generate("/nope", &RequestInfo::default(), 200).unwrap_err();
        assert_eq!(err.flow(), Some(&Flow::NotFound));

        let err = serving.generate("/moved", &RequestInfo::default(), 200).unwrap_err();
        assert_eq!(
            err.flow(),
            Some(&Flow::Redirect {
                url: "/new".to_owned(),
                permanent: true
            })
        );
    }

    #[test]
    fn test_not_found_page() {
        let (dir, serving) = site();
        let page = serving.not_found(&RequestInfo::default());
        assert_eq!((page.body.as_str(), page.status), (NOT_FOUND_BODY, 404));

        write(dir.path(), "pages/404.html", "Lost {{ site.title }}");
        serving.reload();

        let page = serving.not_found(&RequestInfo::default());
        assert_eq!((page.body.trim(), page.status), ("Lost My Site", 404));
    }

    #[test]
    fn test_not_found_page_that_halts_falls_back() {
        let (dir, serving) = site();
        write(dir.path(), "pages/404.html", "{{ not_found() }}");
        serving.reload();

        assert_eq!(serving.not_found(&RequestInfo::default()).body, NOT_FOUND_BODY);
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let (dir, serving) = site();
        assert_eq!(render(&serving, "/tag/x").body.trim(), "Tag x");

        write(dir.path(), "pages/tag.html", "---\npermalink: /tag/{name}\n---\nTagged {{ params.name }}");
        write(dir.path(), "config.yml", "title: Renamed\n");
        serving.reload();

        assert_eq!(render(&serving, "/tag/x").body.trim(), "Tagged x");
        assert!(render(&serving, "/first").body.contains("First on Renamed"));
    }

    #[test]
    fn test_reload_flag() {
        let (_dir, serving) = site();
        assert!(serving.reload_enabled());
        serving.set_reload_enabled(false);
        assert!(!serving.reload_enabled());
    }

    #[test]
    fn test_feed_uses_site_title() {
        let (_dir, serving) = site();
        let xml = serving.feed(&RequestInfo::default()).unwrap();

        let feed = xml.parse::<atom_syndication::Feed>().unwrap();
        assert_eq!(feed.title().value, "My Site");
    }
}
