//! Request context used to build absolute URLs.

use landing_template::{Map, Value};

/// Scope variable carrying the request context into templates.
pub const REQUEST_VAR: &str = "_request";

/// Host and scheme a page is rendered for.
///
/// Without a host, absolute URLs stay site-relative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInfo {
    pub host: Option<String>,
    pub scheme: String,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            host: None,
            scheme: "http".to_owned(),
        }
    }
}

impl RequestInfo {
    #[must_use]
    pub fn new(host: Option<String>, scheme: impl Into<String>) -> Self {
        Self {
            host: host.filter(|h| !h.is_empty()),
            scheme: scheme.into(),
        }
    }

    /// `scheme://host`, or the host itself when it already has a scheme.
    #[must_use]
    pub fn origin(&self) -> Option<String> {
        let host = self.host.as_deref()?.trim_end_matches('/');
        if host.contains("://") {
            Some(host.to_owned())
        } else {
            Some(format!("{}://{host}", self.scheme))
        }
    }

    /// Absolute URL for a site path. URLs that already carry a scheme are
    /// returned unchanged, and so is everything when there is no host.
    #[must_use]
    pub fn absolute(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_owned();
        }
        match self.origin() {
            Some(origin) => format!("{origin}/{}", path.trim_start_matches('/'))
                .trim_end_matches('/')
                .to_owned(),
            None => path.to_owned(),
        }
    }

    /// The `_request` scope value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::from(Map::from([
            ("host".to_owned(), Value::from(self.host.clone())),
            ("scheme".to_owned(), Value::from(self.scheme.as_str())),
            ("origin".to_owned(), Value::from(self.origin())),
        ]))
    }

    /// Read back a `_request` scope value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let scheme = value
            .attr("scheme")
            .to_text_opt()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http".to_owned());
        Self::new(value.attr("host").to_text_opt(), scheme)
    }
}

fn is_absolute(url: &str) -> bool {
    ["http://", "https://", "data:", "//"]
        .iter()
        .any(|prefix| url.starts_with(prefix))
}
