//! Files with a YAML front matter header.
//!
//! A file starts with a header when its first line is exactly `---`. The
//! header runs until the next `---` line and everything after that line is
//! the body:
//!
//! ```text
//! ---
//! title: Hello
//! permalink: /hello
//! ---
//! Body text
//! ```
//!
//! Files without the opening line are headerless; their whole text is the
//! body.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde_yaml::Mapping;

use crate::error::{StorageError, StorageErrorKind};
use crate::markdown::markdown_to_html;

/// Content kind derived from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// `.md` or `.markdown`.
    Markdown,
    /// `.html`.
    Html,
    /// `.xml`.
    Xml,
    /// Anything else.
    Other,
}

impl FileKind {
    /// Classify a path by extension.
    #[must_use]
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md" | "markdown") => Self::Markdown,
            Some("html") => Self::Html,
            Some("xml") => Self::Xml,
            _ => Self::Other,
        }
    }
}

/// Split text into `(header, body)`.
///
/// Tolerates `\n`, `\r\n` and `\r` line endings. The header excludes the line
/// break before the closing delimiter. A missing closing delimiter means the
/// text has no header.
#[must_use]
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let Some(after_open) = strip_delimiter_line(text) else {
        return (None, text);
    };

    let mut pos = 0;
    loop {
        let rest = &after_open[pos..];
        if let Some(body) = strip_delimiter_line(rest) {
            let header = trim_line_break(&after_open[..pos]);
            return (Some(header), body);
        }
        match next_line(rest) {
            Some(advance) => pos += advance,
            None => return (None, text),
        }
    }
}

/// If `text` starts with a `---` line, return what follows that line.
fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("---")?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .or_else(|| rest.strip_prefix('\r'))
}

/// Byte offset of the next line start, if there is one.
fn next_line(text: &str) -> Option<usize> {
    let i = text.find(['\n', '\r'])?;
    if text[i..].starts_with("\r\n") {
        Some(i + 2)
    } else {
        Some(i + 1)
    }
}

fn trim_line_break(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .or_else(|| text.strip_suffix('\r'))
        .unwrap_or(text)
}

/// One content file split into front matter and body.
///
/// The header is parsed when the file is loaded so that malformed YAML fails
/// the load. The HTML body is rendered on first access and memoized.
#[derive(Debug)]
pub struct FrontMatterFile {
    path: PathBuf,
    kind: FileKind,
    raw: String,
    header_raw: Option<String>,
    body_raw: String,
    header: Mapping,
    body_html: OnceLock<String>,
}

impl FrontMatterFile {
    /// Read and parse a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its header is not a
    /// YAML mapping.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path).map_err(|e| StorageError::io(e, path))?;
        Self::from_text(path, raw)
    }

    /// Parse already loaded text as if it came from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is not a YAML mapping.
    pub fn from_text(path: &Path, raw: String) -> Result<Self, StorageError> {
        let (header_raw, body_raw) = split_front_matter(&raw);
        let header = match header_raw {
            Some(text) => parse_header(text).map_err(|e| e.with_path(path))?,
            None => Mapping::new(),
        };
        let header_raw = header_raw.map(str::to_owned);
        let body_raw = body_raw.to_owned();

        Ok(Self {
            path: path.to_path_buf(),
            kind: FileKind::of(path),
            raw,
            header_raw,
            body_raw,
            header,
            body_html: OnceLock::new(),
        })
    }

    /// Path the file was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content kind from the extension.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    #[must_use]
    pub fn is_markdown(&self) -> bool {
        self.kind == FileKind::Markdown
    }

    #[must_use]
    pub fn is_html(&self) -> bool {
        self.kind == FileKind::Html
    }

    #[must_use]
    pub fn is_xml(&self) -> bool {
        self.kind == FileKind::Xml
    }

    /// Whole file text, header included.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Header text between the delimiters.
    #[must_use]
    pub fn header_raw(&self) -> Option<&str> {
        self.header_raw.as_deref()
    }

    /// Body text after the header.
    #[must_use]
    pub fn body_raw(&self) -> &str {
        &self.body_raw
    }

    /// Parsed header; empty when the file has none.
    #[must_use]
    pub fn header(&self) -> &Mapping {
        &self.header
    }

    /// Header value for a string key.
    #[must_use]
    pub fn header_value(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.header.get(key)
    }

    /// Body as HTML: Markdown bodies are converted, others returned as-is.
    #[must_use]
    pub fn body_html(&self) -> &str {
        self.body_html.get_or_init(|| {
            if self.is_markdown() {
                markdown_to_html(&self.body_raw)
            } else {
                self.body_raw.clone()
            }
        })
    }

    /// Rebuild the file text with this header and a replacement body.
    #[must_use]
    pub fn with_body(&self, body: &str) -> String {
        match &self.header_raw {
            Some(header) => format!("---\n{}\n---\n{body}", header.trim()),
            None => body.to_owned(),
        }
    }
}

fn parse_header(text: &str) -> Result<Mapping, StorageError> {
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| StorageError::new(StorageErrorKind::InvalidFrontMatter).with_source(e))?;
    match value {
        serde_yaml::Value::Mapping(map) => Ok(map),
        serde_yaml::Value::Null => Ok(Mapping::new()),
        _ => Err(StorageError::new(StorageErrorKind::InvalidFrontMatter)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    static_assertions::assert_impl_all!(FrontMatterFile: Send, Sync);

    #[test]
    fn test_split_header_and_body() {
        assert_eq!(
            split_front_matter("---\nA: 1\n---\nBODY"),
            (Some("A: 1"), "BODY")
        );
    }

    #[test]
    fn test_split_without_header() {
        let text = "just a body\nwith lines";
        assert_eq!(split_front_matter(text), (None, text));
    }

    #[test]
    fn test_split_crlf_and_cr() {
        assert_eq!(
            split_front_matter("---\r\ntitle: x\r\n---\r\nbody\r\n"),
            (Some("title: x"), "body\r\n")
        );
        assert_eq!(
            split_front_matter("---\rtitle: x\r---\rbody"),
            (Some("title: x"), "body")
        );
    }

    #[test]
    fn test_split_unterminated_header_is_body() {
        let text = "---\ntitle: x\nno closing";
        assert_eq!(split_front_matter(text), (None, text));
    }

    #[test]
    fn test_split_empty_header() {
        assert_eq!(split_front_matter("---\n---\nbody"), (Some(""), "body"));
    }

    #[test]
    fn test_split_closing_at_end_of_text() {
        assert_eq!(split_front_matter("---\na: 1\n---"), (Some("a: 1"), ""));
    }

    #[test]
    fn test_dashes_inside_body_are_kept() {
        assert_eq!(
            split_front_matter("---\na: 1\n---\none\n---\ntwo"),
            (Some("a: 1"), "one\n---\ntwo")
        );
    }

    #[test]
    fn test_dashes_not_at_start_mean_no_header() {
        let text = "intro\n---\na: 1\n---\nbody";
        assert_eq!(split_front_matter(text), (None, text));
    }

    #[test]
    fn test_file_header_and_markdown_body() {
        let file = FrontMatterFile::from_text(
            Path::new("posts/2020-07-22-hello.md"),
            "---\ntitle: Hello\ntags: [a, b]\n---\n*hi*\n".to_owned(),
        )
        .unwrap();

        assert!(file.is_markdown());
        assert_eq!(file.header_raw(), Some("title: Hello\ntags: [a, b]"));
        assert_eq!(
            file.header_value("title").and_then(|v| v.as_str()),
            Some("Hello")
        );
        assert_eq!(file.body_raw(), "*hi*\n");
        assert_eq!(file.body_html(), "<p><em>hi</em></p>\n");
    }

    #[test]
    fn test_html_body_is_not_converted() {
        let file =
            FrontMatterFile::from_text(Path::new("pages/about.html"), "*raw*".to_owned()).unwrap();

        assert!(file.is_html());
        assert!(file.header().is_empty());
        assert_eq!(file.body_html(), "*raw*");
    }

    #[test]
    fn test_invalid_header_is_an_error() {
        let err = FrontMatterFile::from_text(
            Path::new("posts/bad.md"),
            "---\n- just\n- a list\n---\nbody".to_owned(),
        )
        .unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::InvalidFrontMatter);
        assert_eq!(err.path.as_deref(), Some(Path::new("posts/bad.md")));
    }

    #[test]
    fn test_with_body_keeps_header() {
        let file = FrontMatterFile::from_text(
            Path::new("a.md"),
            "---\nlayout: post\n\n---\nold".to_owned(),
        )
        .unwrap();

        assert_eq!(file.with_body("new"), "---\nlayout: post\n---\nnew");
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = FrontMatterFile::load(&tmp.path().join("missing.md")).unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::NotFound);
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(FileKind::of(Path::new("a.markdown")), FileKind::Markdown);
        assert_eq!(FileKind::of(Path::new("feed.xml")), FileKind::Xml);
        assert_eq!(FileKind::of(Path::new("style.css")), FileKind::Other);
    }
}
