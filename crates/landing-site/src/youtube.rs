//! Video metadata from the YouTube Data API for the `youtube_info` function.
//!
//! Responses are cached twice: the raw body under
//! `youtube.request.<sha1(url)>` and each video under `youtube.info.<id>`,
//! so a video is fetched at most once per cache lifetime.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::DateTime;
use landing_cache::{Cache, CacheExt, DEFAULT_TTL};
use landing_template::{Map, Value};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ureq::Agent;

use crate::config::SiteConfigService;
use crate::error::SiteError;
use crate::images::sha1_hex;

const API_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Secret holding the API key in `secrets.yml`.
pub const API_KEY_SECRET: &str = "youtube_api_key";

const TIMEOUT: Duration = Duration::from_secs(30);

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid regex")
});

/// One thumbnail rendition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub kind: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Cached metadata for one video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_unix_ms: i64,
    pub duration_ms: i64,
    pub thumbnails: Vec<Thumbnail>,
}

impl YoutubeInfo {
    #[must_use]
    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.thumbnails.first()
    }

    /// `H:MM:SS`, or `M:SS` under an hour.
    #[must_use]
    pub fn duration_str(&self) -> String {
        let total = self.duration_ms / 1000;
        let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }

    /// Template view of the video.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let thumbnail = |t: &Thumbnail| {
            Value::from(Map::from([
                ("kind".to_owned(), Value::from(t.kind.as_str())),
                ("url".to_owned(), Value::from(t.url.as_str())),
                ("width".to_owned(), Value::from(t.width)),
                ("height".to_owned(), Value::from(t.height)),
            ]))
        };
        let published = DateTime::from_timestamp_millis(self.published_unix_ms);
        Value::from(Map::from([
            ("id".to_owned(), Value::from(self.id.as_str())),
            ("title".to_owned(), Value::from(self.title.as_str())),
            ("description".to_owned(), Value::from(self.description.as_str())),
            ("published".to_owned(), Value::from(published)),
            ("publishedUnix".to_owned(), Value::Int(self.published_unix_ms)),
            ("durationMilliseconds".to_owned(), Value::Int(self.duration_ms)),
            ("durationStr".to_owned(), Value::from(self.duration_str())),
            (
                "thumbnails".to_owned(),
                self.thumbnails.iter().map(thumbnail).collect(),
            ),
            (
                "thumbnail".to_owned(),
                Value::from(self.thumbnail().map(thumbnail)),
            ),
        ]))
    }
}

/// ISO-8601 video duration such as `PT1H2M3S`.
#[must_use]
pub fn parse_duration(text: &str) -> Option<Duration> {
    let captures = DURATION.captures(text)?;
    let part = |i: usize| -> u64 {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Some(Duration::from_secs(part(1) * 3600 + part(2) * 60 + part(3)))
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    id: String,
    snippet: ApiSnippet,
    content_details: ApiContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSnippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: String,
    #[serde(default)]
    thumbnails: BTreeMap<String, ApiThumbnail>,
}

#[derive(Deserialize)]
struct ApiThumbnail {
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Deserialize)]
struct ApiContentDetails {
    duration: String,
}

/// Parse a `videos` API response body.
///
/// Thumbnails are ordered by kind name, which puts `default` first.
/// Unparsable dates and durations become zero.
///
/// # Errors
///
/// Returns an error if the body is not a videos response.
pub fn parse_response(body: &str) -> Result<Vec<YoutubeInfo>, SiteError> {
    let response: ApiResponse = serde_json::from_str(body)?;
    Ok(response
        .items
        .into_iter()
        .map(|item| {
            let published_unix_ms = DateTime::parse_from_rfc3339(&item.snippet.published_at)
                .map_or(0, |d| d.timestamp_millis());
            let duration_ms = parse_duration(&item.content_details.duration)
                .and_then(|d| i64::try_from(d.as_millis()).ok())
                .unwrap_or(0);
            YoutubeInfo {
                id: item.id,
                title: item.snippet.title,
                description: item.snippet.description,
                published_unix_ms,
                duration_ms,
                thumbnails: item
                    .snippet
                    .thumbnails
                    .into_iter()
                    .map(|(kind, t)| Thumbnail {
                        kind,
                        url: t.url,
                        width: t.width,
                        height: t.height,
                    })
                    .collect(),
            }
        })
        .collect())
}

fn info_key(id: &str) -> String {
    format!("youtube.info.{id}")
}

/// Cached client for video metadata.
pub struct YoutubeService {
    cache: Arc<dyn Cache>,
    config: Arc<SiteConfigService>,
    agent: Agent,
}

impl YoutubeService {
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, config: Arc<SiteConfigService>) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            cache,
            config,
            agent,
        }
    }

    /// Metadata for `ids`, in request order. Unknown videos are skipped.
    ///
    /// Ids missing from the cache are fetched in one request.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::MissingSecret`] without an API key, and HTTP,
    /// JSON or cache errors.
    pub fn video_info(&self, ids: &[String]) -> Result<Vec<YoutubeInfo>, SiteError> {
        let api_key = self
            .config
            .secret(API_KEY_SECRET)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SiteError::MissingSecret(API_KEY_SECRET.to_owned()))?;

        let mut uncached = Vec::new();
        for id in ids {
            if !self.cache.has(&info_key(id))? && !uncached.contains(id) {
                uncached.push(id.clone());
            }
        }

        let mut fetched = HashMap::new();
        if !uncached.is_empty() {
            let url = request_url(&uncached, &api_key);
            let request_key = format!("youtube.request.{}", sha1_hex(&url));
            let body: String = self
                .cache
                .get(&request_key, DEFAULT_TTL, || self.fetch(&url))?;
            for info in parse_response(&body)? {
                self.cache.put(&info_key(&info.id), &info, DEFAULT_TTL)?;
                fetched.insert(info.id.clone(), info);
            }
            debug!(requested = uncached.len(), received = fetched.len(), "Fetched video info");
        }

        let mut infos = Vec::with_capacity(ids.len());
        for id in ids {
            match fetched.get(id) {
                Some(info) => infos.push(info.clone()),
                None => infos.extend(self.cache.get_opt::<YoutubeInfo>(&info_key(id))?),
            }
        }
        Ok(infos)
    }

    fn fetch(&self, url: &str) -> Result<String, SiteError> {
        let response = self
            .agent
            .get(url)
            .header("Accept", "application/json")
            .call()?;
        let status = response.status().as_u16();
        let body = response.into_body().read_to_string()?;
        if status >= 400 {
            warn!(status, "Video metadata request failed");
            return Err(SiteError::HttpResponse { status, body });
        }
        Ok(body)
    }
}

fn request_url(ids: &[String], api_key: &str) -> String {
    let mut url = format!("{API_URL}?part=contentDetails&part=snippet");
    for id in ids {
        url.push_str("&id=");
        url.extend(utf8_percent_encode(id, NON_ALPHANUMERIC));
    }
    url.push_str("&key=");
    url.extend(utf8_percent_encode(api_key, NON_ALPHANUMERIC));
    url
}
