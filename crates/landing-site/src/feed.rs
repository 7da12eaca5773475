//! Atom feed of the newest entries, served at `/rss`.

use std::sync::LazyLock;

use atom_syndication::{
    CategoryBuilder, ContentBuilder, EntryBuilder, Feed, FeedBuilder, FixedDateTime, Link,
    LinkBuilder, Person, PersonBuilder, Text,
};
use chrono::{DateTime, Utc};
use landing_template::{Map, Value};
use regex::Regex;

use crate::entry::Entry;
use crate::error::SiteError;
use crate::index::EntriesIndex;
use crate::request::RequestInfo;

/// Path the feed is served under.
pub const FEED_PATH: &str = "/rss";

const FEED_SIZE: usize = 10;
const SUMMARY_CHARS: usize = 256;

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").expect("valid regex"));

fn summary(html: &str) -> String {
    TAGS.replace_all(html, "").chars().take(SUMMARY_CHARS).collect()
}

fn config_text(config: &Map, key: &str) -> String {
    config.get(key).and_then(Value::to_text_opt).unwrap_or_default()
}

/// Whether an entry belongs in the feed: visible, static and HTML.
fn in_feed(entry: &Entry) -> bool {
    !entry.is_dynamic() && !entry.file().is_xml()
}

fn link(href: String, rel: &str, mime_type: &str, title: Option<&str>) -> Link {
    LinkBuilder::default()
        .href(href)
        .rel(rel.to_owned())
        .mime_type(Some(mime_type.to_owned()))
        .title(title.map(str::to_owned))
        .build()
}

fn feed_entry(entry: &Entry, request: &RequestInfo, author: &Person) -> atom_syndication::Entry {
    let url = request.absolute(&entry.url());
    let date: FixedDateTime = entry.date().into();
    let categories: Vec<_> = entry
        .tags()
        .iter()
        .map(|tag| CategoryBuilder::default().term(tag.clone()).build())
        .collect();
    let content = ContentBuilder::default()
        .value(Some(entry.excerpt().to_owned()))
        .base(Some(url.clone()))
        .content_type(Some("html".to_owned()))
        .build();

    EntryBuilder::default()
        .title(Text::html(entry.title()))
        .id(url.clone())
        .links(vec![link(url, "alternate", "text/html", Some(entry.title()))])
        .published(Some(date))
        .updated(date)
        .authors(vec![author.clone()])
        .categories(categories)
        .content(Some(content))
        .summary(Some(Text::html(summary(entry.file().body_html()))))
        .build()
}

/// Build the feed for `index`.
///
/// Title and subtitle come from the `title` and `description` site
/// settings, the author from `author` falling back to the title.
#[must_use]
pub fn build_feed(index: &EntriesIndex, config: &Map, request: &RequestInfo) -> Feed {
    let root_url = request.absolute("/");
    let title = config_text(config, "title");
    let author = Some(config_text(config, "author"))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| title.clone());
    let author = PersonBuilder::default().name(author).build();

    let entries: Vec<_> = index
        .entries()
        .iter()
        .filter(|e| in_feed(e))
        .take(FEED_SIZE)
        .collect();
    let updated = entries.first().map_or(DateTime::<Utc>::UNIX_EPOCH, |e| e.date());

    FeedBuilder::default()
        .title(Text::html(title))
        .subtitle(Some(Text::plain(config_text(config, "description"))))
        .id(root_url.clone())
        .updated(FixedDateTime::from(updated))
        .links(vec![
            link(request.absolute("/rss/"), "self", "application/atom+xml", None),
            link(root_url, "alternate", "text/html", None),
        ])
        .entries(
            entries
                .into_iter()
                .map(|e| feed_entry(e, request, &author))
                .collect::<Vec<_>>(),
        )
        .build()
}

/// Render the feed for `index` as XML.
///
/// # Errors
///
/// Returns [`SiteError::Feed`] if the feed cannot be serialized.
pub fn atom_feed(
    index: &EntriesIndex,
    config: &Map,
    request: &RequestInfo,
) -> Result<String, SiteError> {
    let xml = build_feed(index, config, request).write_to(Vec::new())?;
    Ok(String::from_utf8_lossy(&xml).into_owned())
}
