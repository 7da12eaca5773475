//! Permalink canonicalization and `{placeholder}` patterns.

use std::sync::LazyLock;

use landing_template::{Map, Value};
use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Placeholder name that only matches digits and binds an integer.
pub const PAGE_PARAM: &str = "n";

/// Canonical form of a path: one leading `/`, no trailing `/` except for
/// the root itself.
///
/// The index and the request router both use this, so `"/about/"`,
/// `"about"` and `"//about"` all find the same entry.
#[must_use]
pub fn canonicalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Whether a permalink contains placeholders.
#[must_use]
pub fn is_dynamic(permalink: &str) -> bool {
    permalink.contains('{')
}

/// Compiled form of a permalink template such as `/blog/{slug}`.
///
/// `{n}` matches digits only and is bound as an integer; other placeholders
/// match word characters and dashes. The pattern is anchored and tolerates
/// trailing slashes.
#[derive(Clone, Debug)]
pub struct PermalinkPattern {
    regex: Regex,
    names: Vec<String>,
}

impl PermalinkPattern {
    /// Compile a permalink template.
    ///
    /// # Errors
    ///
    /// Returns an error when the template repeats a placeholder name.
    pub fn compile(template: &str) -> Result<Self, regex::Error> {
        let template = canonicalize(template);
        let mut pattern = String::from("^");
        let mut names = Vec::new();
        let mut last = 0;

        for captures in PLACEHOLDER.captures_iter(&template) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            pattern.push_str(&regex::escape(&template[last..whole.start()]));
            let class = if name.as_str() == PAGE_PARAM {
                r"\d+"
            } else {
                r"[\w-]+"
            };
            pattern.push_str(&format!("(?P<{}>{class})", name.as_str()));
            names.push(name.as_str().to_owned());
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push_str("/*$");

        Ok(Self {
            regex: Regex::new(&pattern)?,
            names,
        })
    }

    /// Placeholder names in template order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Bind placeholders from a matching path, `None` if it does not match.
    #[must_use]
    pub fn params(&self, path: &str) -> Option<Map> {
        let captures = self.regex.captures(path)?;
        let params = self
            .names
            .iter()
            .filter_map(|name| {
                let raw = captures.name(name)?.as_str();
                let value = if name == PAGE_PARAM {
                    raw.parse::<i64>()
                        .map_or_else(|_| Value::from(raw), Value::Int)
                } else {
                    Value::from(raw)
                };
                Some((name.clone(), value))
            })
            .collect();
        Some(params)
    }
}

/// Substitute a page number for `{n}`.
#[must_use]
pub fn with_page(permalink: &str, page: usize) -> String {
    permalink.replace("{n}", &page.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_canonicalize_root_forms() {
        assert_eq!(canonicalize(""), "/");
        assert_eq!(canonicalize("/"), "/");
        assert_eq!(canonicalize("//"), "/");
    }

    #[test]
    fn test_canonicalize_trims_slashes() {
        assert_eq!(canonicalize("about"), "/about");
        assert_eq!(canonicalize("/about/"), "/about");
        assert_eq!(canonicalize("//blog/post//"), "/blog/post");
        assert_eq!(canonicalize("/blog/post/"), canonicalize("/blog/post"));
    }

    #[test]
    fn test_slug_placeholder_binds_string() {
        let pattern = PermalinkPattern::compile("blog/{slug}").unwrap();

        let params = pattern.params("/blog/hello-world/").unwrap();
        assert_eq!(params.get("slug").unwrap().to_string(), "hello-world");
        assert_eq!(pattern.names(), ["slug"]);
    }

    #[test]
    fn test_page_placeholder_binds_integer() {
        let pattern = PermalinkPattern::compile("/page/{n}").unwrap();

        assert!(pattern.params("/page/abc").is_none());
        let params = pattern.params("/page/3").unwrap();
        assert!(matches!(params.get("n"), Some(Value::Int(3))));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let pattern = PermalinkPattern::compile("/tag/{name}").unwrap();

        assert!(pattern.is_match("/tag/rust"));
        assert!(!pattern.is_match("/x/tag/rust"));
        assert!(!pattern.is_match("/tag/rust/more"));
    }

    #[test]
    fn test_literal_parts_are_escaped() {
        let pattern = PermalinkPattern::compile("/feed.{n}.xml").unwrap();

        assert!(pattern.is_match("/feed.2.xml"));
        assert!(!pattern.is_match("/feedX2Xxml"));
    }

    #[test]
    fn test_repeated_placeholder_is_rejected() {
        assert!(PermalinkPattern::compile("/{a}/{a}").is_err());
    }

    #[test]
    fn test_with_page() {
        assert_eq!(with_page("/blog/page/{n}", 2), "/blog/page/2");
        assert!(is_dynamic("/blog/page/{n}"));
        assert!(!is_dynamic("/blog"));
    }
}
