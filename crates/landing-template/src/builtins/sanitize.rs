//! HTML cleaning for excerpts and plain-text summaries.

use std::sync::LazyLock;

use regex::Regex;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").expect("valid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("valid regex")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("valid regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "caption", "cite", "code", "col", "colgroup", "dd", "div",
    "dl", "dt", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i", "img", "li", "ol", "p", "pre",
    "q", "small", "span", "strike", "strong", "sub", "sup", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "u", "ul",
];

const VOID_TAGS: &[&str] = &["br", "col", "img"];

fn allowed_attributes(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "title"],
        "blockquote" | "q" => &["cite"],
        "col" | "colgroup" => &["span", "width"],
        "img" => &["align", "alt", "height", "src", "title", "width"],
        "ol" => &["start", "type"],
        "table" => &["summary", "width"],
        "td" | "th" => &["abbr", "axis", "colspan", "rowspan", "width"],
        "ul" => &["type"],
        _ => &[],
    }
}

/// Whether a URL attribute value is safe to keep.
fn allowed_url(tag: &str, value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    if lower.starts_with('/') || lower.starts_with('#') {
        return true;
    }
    let schemes: &[&str] = match tag {
        "a" => &["http:", "https:", "ftp:", "mailto:"],
        _ => &["http:", "https:"],
    };
    schemes.iter().any(|scheme| lower.starts_with(scheme))
}

fn is_url_attribute(name: &str) -> bool {
    matches!(name, "href" | "src" | "cite")
}

/// Clean an HTML fragment against a relaxed allowlist.
///
/// Disallowed tags are dropped but their text is kept; `script` and `style`
/// are removed with their content. A tag cut off at the end of the input is
/// discarded and unclosed tags are closed, so truncated HTML comes out well
/// formed. A `<` that does not open a recognizable tag is escaped.
#[must_use]
pub fn clean_html(html: &str) -> String {
    let html = COMMENT.replace_all(html, "");
    let html = SCRIPT_OR_STYLE.replace_all(&html, "");
    let mut html: &str = &html;
    if let Some(lt) = html.rfind('<')
        && !html[lt..].contains('>')
    {
        html = &html[..lt];
    }

    let mut out = String::with_capacity(html.len());
    let mut open: Vec<String> = Vec::new();
    let mut last = 0;

    for captures in TAG.captures_iter(html) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        push_text(&mut out, &html[last..whole.start()]);
        last = whole.end();

        let closing = captures.get(1).is_some_and(|m| !m.is_empty());
        let name = captures
            .get(2)
            .map_or(String::new(), |m| m.as_str().to_ascii_lowercase());
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }

        if closing {
            if let Some(position) = open.iter().rposition(|tag| *tag == name) {
                for tag in open.drain(position..).rev() {
                    out.push_str(&format!("</{tag}>"));
                }
            }
            continue;
        }

        out.push('<');
        out.push_str(&name);
        let attributes = captures.get(3).map_or("", |m| m.as_str());
        push_attributes(&mut out, &name, attributes);
        out.push('>');
        if !VOID_TAGS.contains(&name.as_str()) && !attributes.trim_end().ends_with('/') {
            open.push(name);
        }
    }
    push_text(&mut out, &html[last..]);

    for tag in open.iter().rev() {
        out.push_str(&format!("</{tag}>"));
    }
    out
}

fn push_text(out: &mut String, text: &str) {
    out.push_str(&text.replace('<', "&lt;"));
}

fn push_attributes(out: &mut String, tag: &str, attributes: &str) {
    let allowed = allowed_attributes(tag);
    for captures in ATTRIBUTE.captures_iter(attributes) {
        let name = captures
            .get(1)
            .map_or(String::new(), |m| m.as_str().to_ascii_lowercase());
        if !allowed.contains(&name.as_str()) {
            continue;
        }
        let raw = captures
            .get(2)
            .or_else(|| captures.get(3))
            .or_else(|| captures.get(4))
            .map_or("", |m| m.as_str());
        // Checked decoded, as the browser will see it.
        let value = html_escape::decode_html_entities(raw);
        if is_url_attribute(&name) && !allowed_url(tag, &value) {
            continue;
        }
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&value));
        out.push('"');
    }
}

/// Text content of an HTML fragment with entities decoded and whitespace
/// collapsed.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let html = COMMENT.replace_all(html, "");
    let html = SCRIPT_OR_STYLE.replace_all(&html, "");
    let text = ANY_TAG.replace_all(&html, " ");
    let text = html_escape::decode_html_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
