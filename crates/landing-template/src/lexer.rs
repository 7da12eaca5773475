//! Splits template source into text, output and tag chunks.
//!
//! - `{{ expr }}` outputs an expression
//! - `{% name args %}` is a tag
//! - `{{-`, `-}}`, `{%-` and `-%}` trim whitespace on that side
//! - `{% raw %}...{% endraw %}` is emitted as literal text

use std::sync::LazyLock;

use regex::Regex;

use crate::error::TemplateError;

static END_RAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?\s*endraw\s*(-?)%\}").expect("valid regex"));

/// One lexical piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Chunk {
    Text(String),
    Output {
        source: String,
        line: usize,
    },
    Tag {
        name: String,
        args: String,
        line: usize,
    },
}

/// Split `source` into chunks. `template` names the source in errors.
pub(crate) fn tokenize(source: &str, template: &str) -> Result<Vec<Chunk>, TemplateError> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;
    let mut lines = LineCounter::default();

    loop {
        let Some(start) = find_open(source, pos) else {
            push_text(&mut chunks, &source[pos..], trim_next, false);
            break;
        };

        let is_output = source.as_bytes()[start + 1] == b'{';
        let mut inner_start = start + 2;
        let trim_before = source[inner_start..].starts_with('-');
        if trim_before {
            inner_start += 1;
        }
        push_text(&mut chunks, &source[pos..start], trim_next, trim_before);

        let line = lines.line_at(source, start);
        let close = if is_output { "}}" } else { "%}" };
        let Some(end) = find_close(source, inner_start, close) else {
            return Err(TemplateError::Parse {
                template: template.to_owned(),
                line,
                message: format!("missing closing `{close}`"),
            });
        };

        let mut inner_end = end;
        trim_next = false;
        if inner_end > inner_start && source[..inner_end].ends_with('-') {
            inner_end -= 1;
            trim_next = true;
        }
        let inner = source[inner_start..inner_end].trim();
        pos = end + close.len();

        if is_output {
            chunks.push(Chunk::Output {
                source: inner.to_owned(),
                line,
            });
            continue;
        }

        let (name, args) = inner
            .split_once(char::is_whitespace)
            .map_or((inner, ""), |(name, args)| (name, args.trim()));

        if name == "raw" {
            let Some(end_raw) = END_RAW.captures_at(source, pos) else {
                return Err(TemplateError::Parse {
                    template: template.to_owned(),
                    line,
                    message: "missing `{% endraw %}`".to_owned(),
                });
            };
            let whole = end_raw.get(0).map_or(source.len()..source.len(), |m| m.range());
            push_text(&mut chunks, &source[pos..whole.start], trim_next, false);
            trim_next = end_raw.get(1).is_some_and(|m| !m.is_empty());
            pos = whole.end;
            continue;
        }

        chunks.push(Chunk::Tag {
            name: name.to_owned(),
            args: args.to_owned(),
            line,
        });
    }

    Ok(chunks)
}

fn push_text(chunks: &mut Vec<Chunk>, text: &str, trim_start: bool, trim_end: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    let text = if trim_end { text.trim_end() } else { text };
    if !text.is_empty() {
        chunks.push(Chunk::Text(text.to_owned()));
    }
}

/// Position of the next `{{` or `{%` at or after `from`.
fn find_open(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while let Some(offset) = source[i..].find('{') {
        let at = i + offset;
        match bytes.get(at + 1) {
            Some(b'{' | b'%') => return Some(at),
            Some(_) => i = at + 1,
            None => return None,
        }
    }
    None
}

/// Position of `close` at or after `from`, skipping quoted strings.
fn find_close(source: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            _ if source[i..].starts_with(close) => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Incremental line counter for monotonically increasing offsets.
#[derive(Default)]
struct LineCounter {
    offset: usize,
    line: usize,
}

impl LineCounter {
    fn line_at(&mut self, source: &str, offset: usize) -> usize {
        self.line += source[self.offset..offset].matches('\n').count();
        self.offset = offset;
        self.line + 1
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn text(s: &str) -> Chunk {
        Chunk::Text(s.to_owned())
    }

    #[test]
    fn test_text_output_and_tag() {
        let chunks = tokenize("Hi {{ name }}!{% if x %}y{% endif %}", "t").unwrap();

        assert_eq!(
            chunks,
            vec![
                text("Hi "),
                Chunk::Output {
                    source: "name".to_owned(),
                    line: 1
                },
                text("!"),
                Chunk::Tag {
                    name: "if".to_owned(),
                    args: "x".to_owned(),
                    line: 1
                },
                text("y"),
                Chunk::Tag {
                    name: "endif".to_owned(),
                    args: String::new(),
                    line: 1
                },
            ]
        );
    }

    #[test]
    fn test_whitespace_trim_markers() {
        let chunks = tokenize("a  \n{%- set x = 1 -%}\n  b", "t").unwrap();

        assert_eq!(chunks.first(), Some(&text("a")));
        assert_eq!(chunks.last(), Some(&text("b")));
    }

    #[test]
    fn test_close_inside_string_is_skipped() {
        let chunks = tokenize(r#"{{ "}}" }}"#, "t").unwrap();
        assert_eq!(
            chunks,
            vec![Chunk::Output {
                source: r#""}}""#.to_owned(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_raw_block_is_literal() {
        let chunks = tokenize("{% raw %}{{ not evaluated }}{% endraw %}!", "t").unwrap();
        assert_eq!(chunks, vec![text("{{ not evaluated }}"), text("!")]);
    }

    #[test]
    fn test_line_numbers() {
        let chunks = tokenize("one\ntwo\n{{ x }}\n{% y %}", "t").unwrap();
        let lines: Vec<usize> = chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Output { line, .. } | Chunk::Tag { line, .. } => Some(*line),
                Chunk::Text(_) => None,
            })
            .collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn test_unclosed_tag_is_an_error() {
        let err = tokenize("ok\n{% if x ", "page.html").unwrap_err();
        assert_eq!(err.to_string(), "page.html:2: missing closing `%}`");
    }

    #[test]
    fn test_lone_braces_are_text() {
        let chunks = tokenize("a { b } c {", "t").unwrap();
        assert_eq!(chunks, vec![text("a { b } c {")]);
    }
}
