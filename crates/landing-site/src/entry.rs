//! Indexed content entries.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDate, Utc};
use landing_storage::FrontMatterFile;
use landing_template::{ContentType, Map, Object, TemplateSource, Value, parse_any_date, yaml_map};
use regex::Regex;
use tracing::debug;

use crate::error::SiteError;
use crate::permalink::{PermalinkPattern, canonicalize, is_dynamic};

static DATED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)-(\d+)-(.*)$").expect("valid regex"));

/// Marker separating the excerpt from the rest of a body.
pub const MORE_MARKER: &str = "<!--more-->";

/// One content item: a post, a page or a collection member.
///
/// Built once per index rebuild and never mutated afterwards.
#[derive(Debug)]
pub struct Entry {
    file: FrontMatterFile,
    category: String,
    permalink: String,
    pattern: Option<PermalinkPattern>,
    date: DateTime<Utc>,
    title: String,
    tags: BTreeSet<String>,
    hidden: bool,
    feature_image: Option<String>,
    icon: Option<String>,
    pagination_list: Option<String>,
    pagination_size: Option<usize>,
    headers: Arc<Map>,
}

impl Entry {
    /// Load and index one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, its front matter is
    /// malformed or its permalink does not compile.
    pub fn load(path: &Path, category: &str) -> Result<Self, SiteError> {
        Self::from_file(FrontMatterFile::load(path)?, category)
    }

    /// Index an already parsed file.
    ///
    /// The date comes from a `YYYY-MM-DD-` file name prefix, then from the
    /// `date` header, then defaults to the Unix epoch. An unparsable date
    /// falls through silently.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Permalink`] when the permalink template repeats
    /// a placeholder.
    pub fn from_file(file: FrontMatterFile, category: &str) -> Result<Self, SiteError> {
        let stem = file
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();
        let headers = yaml_map(file.header());
        let text = |key: &str| headers.get(key).and_then(Value::to_text_opt);

        let mut date = DateTime::<Utc>::UNIX_EPOCH;
        let mut slug = stem.clone();
        if let Some(captures) = DATED_NAME.captures(&stem) {
            if let Some(parsed) = dated_prefix(&captures) {
                date = parsed;
            }
            slug = captures[4].to_owned();
        }
        if let Some(raw) = text("date") {
            match parse_any_date(&raw) {
                Some(parsed) => date = parsed,
                None => debug!(path = %file.path().display(), date = %raw, "Unparsed entry date"),
            }
        }

        let permalink = canonicalize(&text("permalink").unwrap_or(slug));
        let pattern = if is_dynamic(&permalink) {
            Some(
                PermalinkPattern::compile(&permalink).map_err(|source| SiteError::Permalink {
                    permalink: permalink.clone(),
                    source,
                })?,
            )
        } else {
            None
        };

        let tags = match headers.get("tags") {
            Some(Value::List(items)) => items.iter().map(ToString::to_string).collect(),
            _ => BTreeSet::new(),
        };
        let pagination_size = headers
            .get("pagination_size")
            .and_then(Value::to_int_opt)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0);

        Ok(Self {
            category: category.to_owned(),
            title: text("title").unwrap_or(stem),
            hidden: text("hidden").is_some_and(|h| h == "true"),
            feature_image: text("feature_image"),
            icon: text("icon"),
            pagination_list: text("pagination_list").filter(|s| !s.trim().is_empty()),
            pagination_size,
            permalink,
            pattern,
            date,
            tags,
            headers: Arc::new(headers),
            file,
        })
    }

    #[must_use]
    pub fn file(&self) -> &FrontMatterFile {
        &self.file
    }

    /// Canonical permalink, possibly with placeholders.
    #[must_use]
    pub fn permalink(&self) -> &str {
        &self.permalink
    }

    /// Compiled pattern for dynamic permalinks.
    #[must_use]
    pub fn pattern(&self) -> Option<&PermalinkPattern> {
        self.pattern.as_ref()
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.pattern.is_some()
    }

    /// Link to the entry as used in listings.
    #[must_use]
    pub fn url(&self) -> String {
        if self.permalink == "/" {
            "/".to_owned()
        } else {
            format!("{}/", self.permalink)
        }
    }

    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// `posts`, `pages` or a collection name.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Expression producing the list to paginate, with the page size.
    #[must_use]
    pub fn pagination(&self) -> Option<(&str, usize)> {
        match (&self.pagination_list, self.pagination_size) {
            (Some(list), Some(size)) if self.permalink.contains("{n}") => Some((list, size)),
            _ => None,
        }
    }

    /// Full parsed front matter.
    #[must_use]
    pub fn headers(&self) -> &Map {
        &self.headers
    }

    /// Body HTML before the `<!--more-->` marker.
    #[must_use]
    pub fn excerpt(&self) -> &str {
        let body = self.file.body_html();
        body.split_once(MORE_MARKER).map_or(body, |(head, _)| head)
    }

    /// The entry file as a root template.
    #[must_use]
    pub fn template_source(&self) -> TemplateSource {
        TemplateSource::new(self.file.raw(), ContentType::of(self.file.path()))
    }

    /// Template view sharing this entry.
    #[must_use]
    pub fn to_value(self: &Arc<Self>) -> Value {
        Value::Object(Arc::clone(self) as Arc<dyn Object>)
    }
}

fn dated_prefix(captures: &regex::Captures<'_>) -> Option<DateTime<Utc>> {
    let year = captures[1].parse().ok()?;
    let month = captures[2].parse().ok()?;
    let day = captures[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

const KEYS: &[&str] = &[
    "title",
    "permalink",
    "url",
    "date",
    "tags",
    "hidden",
    "category",
    "feature_image",
    "icon",
    "content",
    "excerpt",
    "headers",
    "path",
];

impl Object for Entry {
    fn get(&self, key: &str) -> Option<Value> {
        let value = match key {
            "title" => Value::from(self.title.as_str()),
            "permalink" => Value::from(self.permalink.as_str()),
            "url" => Value::from(self.url()),
            "date" => Value::Date(self.date),
            "tags" => self.tags.iter().map(|t| Value::from(t.as_str())).collect(),
            "hidden" => Value::Bool(self.hidden),
            "category" => Value::from(self.category.as_str()),
            "feature_image" => Value::from(self.feature_image.clone()),
            "icon" => Value::from(self.icon.clone()),
            "content" | "body" => Value::from(self.file.body_html()),
            "excerpt" => Value::from(self.excerpt()),
            "headers" => Value::Map(Arc::clone(&self.headers)),
            "path" => Value::from(self.file.path().display().to_string()),
            other => return self.headers.get(other).cloned(),
        };
        Some(value)
    }

    fn to_text(&self) -> String {
        self.title.clone()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = KEYS.iter().map(|k| (*k).to_owned()).collect();
        keys.extend(
            self.headers
                .keys()
                .filter(|k| !KEYS.contains(&k.as_str()))
                .cloned(),
        );
        keys
    }
}
