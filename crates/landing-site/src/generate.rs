//! Static site generation.
//!
//! Every indexed entry is rendered in parallel on the global rayon pool and
//! written under `_site/`. Paginated entries expand to one file per page.
//! Failures of individual pages are collected rather than aborting the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use landing_template::Map;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::SiteError;
use crate::feed::FEED_PATH;
use crate::images::RESIZES_URL;
use crate::index::EntriesIndex;
use crate::permalink::with_page;
use crate::request::RequestInfo;
use crate::serving::{LandingServing, PageType};

/// A page that could not be generated.
#[derive(Debug)]
pub struct PageFailure {
    pub permalink: String,
    pub error: SiteError,
}

/// Outcome of [`LandingServing::generate_site`].
#[derive(Debug, Default)]
pub struct GenerateReport {
    /// Files written for pages, the feed included.
    pub pages: usize,
    /// Pages skipped because they halted with not-found or a redirect.
    pub skipped: usize,
    /// Static and resized image files copied.
    pub assets: usize,
    pub failures: Vec<PageFailure>,
}

enum PageResult {
    Written,
    Skipped,
}

/// Where a rendered page is written.
///
/// Permalinks that already name an `.html` or `.xml` file are written as is;
/// others become `<permalink>/index.<ext>`.
#[must_use]
pub fn output_path(output: &Path, permalink: &str, page_type: PageType) -> PathBuf {
    let relative = permalink.trim_matches('/');
    let has_extension = Path::new(relative)
        .extension()
        .is_some_and(|ext| ext == "html" || ext == "xml");
    if has_extension {
        output.join(relative)
    } else {
        output
            .join(relative)
            .join(format!("index.{}", page_type.extension()))
    }
}

/// Number of pages needed for `items` at `size` per page.
///
/// An empty list yields no pages. A zero size counts as one item per page.
#[must_use]
pub fn page_count(items: usize, size: usize) -> usize {
    items.div_ceil(size.max(1))
}

fn write_file(path: &Path, contents: &str) -> Result<(), SiteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SiteError::io(e, parent))?;
    }
    fs::write(path, contents).map_err(|e| SiteError::io(e, path))
}

/// Copy the tree under `from` into `to`, returning the number of files.
/// A missing `from` copies nothing.
fn copy_tree(from: &Path, to: &Path) -> Result<usize, SiteError> {
    if !from.is_dir() {
        return Ok(0);
    }
    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            SiteError::io(e.into(), path)
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| SiteError::io(e, &target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| SiteError::io(e, entry.path()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

impl LandingServing {
    /// Permalinks to generate: static entries as they are, paginated entries
    /// once per page. Other dynamic entries cannot be enumerated and are
    /// left out.
    fn generated_permalinks(
        &self,
        index: &EntriesIndex,
        request: &RequestInfo,
        failures: &mut Vec<PageFailure>,
    ) -> Vec<String> {
        let mut permalinks = Vec::with_capacity(index.len());
        for entry in index.all() {
            if let Some((list, size)) = entry.pagination() {
                let scope = self.scope(index, request, Some(entry), Map::new(), Map::new());
                match self.templates().eval_str(list, scope) {
                    Ok(items) => {
                        let pages = page_count(items.len(), size);
                        permalinks.extend((1..=pages).map(|n| with_page(entry.permalink(), n)));
                    }
                    Err(e) => failures.push(PageFailure {
                        permalink: entry.permalink().to_owned(),
                        error: e.into(),
                    }),
                }
            } else if entry.is_dynamic() {
                debug!(permalink = entry.permalink(), "Skipping dynamic entry");
            } else {
                permalinks.push(entry.permalink().to_owned());
            }
        }
        permalinks
    }

    fn write_page(
        &self,
        permalink: &str,
        request: &RequestInfo,
        output: &Path,
    ) -> Result<PageResult, SiteError> {
        match self.generate(permalink, request, 200) {
            Ok(page) => {
                write_file(&output_path(output, permalink, page.page_type), &page.body)?;
                Ok(PageResult::Written)
            }
            Err(e) if e.flow().is_some() => {
                debug!(permalink, error = %e, "Page halted, not written");
                Ok(PageResult::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// Render the whole site into `_site/`.
    ///
    /// Change-triggered reloads are switched off first. Absolute URLs use
    /// `request`; with no host they stay site-relative.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be indexed or assets cannot be
    /// copied. Page failures are reported in [`GenerateReport::failures`].
    pub fn generate_site(&self, request: &RequestInfo) -> Result<GenerateReport, SiteError> {
        self.set_reload_enabled(false);
        let started = Instant::now();
        let output = self.folders().output_dir();
        let index = self.entries()?;

        let mut report = GenerateReport::default();
        let permalinks = self.generated_permalinks(&index, request, &mut report.failures);

        let results: Vec<(&String, Result<PageResult, SiteError>)> = permalinks
            .par_iter()
            .map(|permalink| (permalink, self.write_page(permalink, request, &output)))
            .collect();
        for (permalink, result) in results {
            match result {
                Ok(PageResult::Written) => report.pages += 1,
                Ok(PageResult::Skipped) => report.skipped += 1,
                Err(error) => {
                    warn!(permalink = %permalink, error = %error, "Page generation failed");
                    report.failures.push(PageFailure {
                        permalink: permalink.clone(),
                        error,
                    });
                }
            }
        }

        if index.get(FEED_PATH).is_none() {
            let feed = self.feed(request)?;
            write_file(&output_path(&output, FEED_PATH, PageType::Xml), &feed)?;
            report.pages += 1;
        }

        report.assets += copy_tree(&self.folders().static_dir(), &output)?;
        report.assets += copy_tree(
            &self.folders().resizes_dir(),
            &output.join(RESIZES_URL.trim_matches('/')),
        )?;

        info!(
            pages = report.pages,
            skipped = report.skipped,
            assets = report.assets,
            failures = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis(),
            output = %output.display(),
            "Generated site"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use landing_cache::NullCache;
    use landing_storage::Folders;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, name: &str, text: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn read(root: &Path, name: &str) -> String {
        fs::read_to_string(root.join("_site").join(name)).unwrap()
    }

    #[test]
    fn test_output_path() {
        let out = Path::new("/out");

        assert_eq!(output_path(out, "/", PageType::Html), Path::new("/out/index.html"));
        assert_eq!(
            output_path(out, "/blog/post", PageType::Html),
            Path::new("/out/blog/post/index.html")
        );
        assert_eq!(output_path(out, "/rss", PageType::Xml), Path::new("/out/rss/index.xml"));
        assert_eq!(
            output_path(out, "/sitemap.xml", PageType::Xml),
            Path::new("/out/sitemap.xml")
        );
        assert_eq!(output_path(out, "/a.html", PageType::Html), Path::new("/out/a.html"));
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(25, 10), 3);
        assert_eq!(page_count(20, 10), 2);
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(3, 0), 3);
    }

    #[test]
    fn test_generate_site() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "config.yml", "title: Gen\n");
        write(root, "posts/2020-01-01-one.md", "---\ntitle: One\n---\nHello");
        write(root, "posts/2020-01-02-two.md", "---\ntitle: Two\n---\nWorld");
        write(root, "posts/2020-01-03-three.md", "---\ntitle: Three\n---\n!");
        write(
            root,
            "pages/blog.html",
            "---\npermalink: /blog/{n}\npagination_list: site.posts\npagination_size: 2\n---\npage {{ params.n }}",
        );
        write(root, "pages/tag.html", "---\npermalink: /tag/{name}\n---\nTag");
        write(root, "pages/gone.html", "{{ not_found() }}");
        write(root, "pages/broken.html", "{{ nope | unknown_filter }}");
        write(root, "static/css/site.css", "a{}");
        write(root, ".cache/__resizes/1x1/a/ab/abcd/abcd.jpg", "jpg");
        let serving =
            LandingServing::new(Folders::new(root), Arc::new(NullCache)).unwrap();

        let report = serving
            .generate_site(&RequestInfo::new(Some("example.com".to_owned()), "https"))
            .unwrap();

        assert!(!serving.reload_enabled());
        assert!(read(root, "one/index.html").contains("<p>Hello</p>"));
        assert_eq!(read(root, "blog/1/index.html").trim(), "page 1");
        assert_eq!(read(root, "blog/2/index.html").trim(), "page 2");
        assert!(!root.join("_site/blog/3").exists());
        assert!(!root.join("_site/tag").exists());
        assert!(!root.join("_site/gone").exists());
        assert!(read(root, "rss/index.xml").contains("https://example.com/three"));
        assert_eq!(read(root, "css/site.css"), "a{}");
        assert_eq!(read(root, "__resizes/1x1/a/ab/abcd/abcd.jpg"), "jpg");

        // one, two, three, blog/1, blog/2, rss
        assert_eq!(report.pages, 6);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.assets, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].permalink, "/broken");
    }

    #[test]
    fn test_pagination_writes_exactly_the_needed_pages() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let items: String = (1..=25).map(|i| format!("- item{i}\n")).collect();
        write(root, "data/items.yml", &items);
        write(
            root,
            "pages/list.html",
            "---\npermalink: /list/{n}\npagination_list: data.items\npagination_size: 10\n---\npage {{ params.n }}",
        );
        write(
            root,
            "pages/empty.html",
            "---\npermalink: /empty/{n}\npagination_list: site.posts\npagination_size: 10\n---\nnone",
        );
        let serving =
            LandingServing::new(Folders::new(root), Arc::new(NullCache)).unwrap();

        let report = serving.generate_site(&RequestInfo::default()).unwrap();

        for n in 1..=3 {
            assert_eq!(read(root, &format!("list/{n}/index.html")).trim(), format!("page {n}"));
        }
        assert!(!root.join("_site/list/4").exists());
        assert!(!root.join("_site/empty").exists());
        // three list pages and the feed
        assert_eq!(report.pages, 4);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_copy_tree_keeps_nested_layout() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "from/a.txt", "a");
        write(dir.path(), "from/deep/er/b.txt", "b");

        let copied = copy_tree(&dir.path().join("from"), &dir.path().join("to")).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(dir.path().join("to/deep/er/b.txt")).unwrap(), "b");
        assert_eq!(copy_tree(&dir.path().join("missing"), &dir.path().join("to")).unwrap(), 0);
    }
}
