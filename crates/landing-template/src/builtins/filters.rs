//! Generic filters.

use std::cmp::Ordering;
use std::sync::LazyLock;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use sha1::{Digest, Sha1};
use tracing::warn;

use super::sanitize::{clean_html, strip_html as strip_tags};
use crate::context::{Context, arithmetic};
use crate::error::RenderError;
use crate::expr::BinaryOp;
use crate::value::{Map, Value};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Characters kept by `excerpt` before cleaning.
const EXCERPT_CHARS: usize = 200;

type FilterResult = Result<Value, RenderError>;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn text(value: impl Into<String>) -> FilterResult {
    Ok(Value::from(value.into()))
}

pub(super) fn upper(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(subject.to_string().to_uppercase())
}

pub(super) fn lower(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(subject.to_string().to_lowercase())
}

pub(super) fn capitalize(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    let s = subject.to_string();
    let mut chars = s.chars();
    text(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    })
}

pub(super) fn strip(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(subject.to_string().trim())
}

pub(super) fn size(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    Ok(Value::from(subject.len()))
}

pub(super) fn first(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    Ok(match subject {
        Value::String(s) => s.chars().next().map(String::from).into(),
        other => other.to_list().into_iter().next().unwrap_or_default(),
    })
}

pub(super) fn last(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    Ok(match subject {
        Value::String(s) => s.chars().last().map(String::from).into(),
        other => other.to_list().pop().unwrap_or_default(),
    })
}

pub(super) fn join(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let separator = args.first().map_or_else(|| " ".to_owned(), ToString::to_string);
    let parts: Vec<String> = subject.to_list().iter().map(ToString::to_string).collect();
    text(parts.join(&separator))
}

pub(super) fn split(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let separator = arg(args, 0).to_string();
    let s = subject.to_string();
    if s.is_empty() {
        return Ok(Value::from(Vec::new()));
    }
    Ok(if separator.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(separator.as_str()).map(Value::from).collect()
    })
}

pub(super) fn reverse(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    Ok(match subject {
        Value::String(s) => Value::from(s.chars().rev().collect::<String>()),
        other => other.to_list().into_iter().rev().collect(),
    })
}

/// `sort` or `sort: "attribute"`; incomparable values keep their order.
pub(super) fn sort(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let mut items = subject.to_list();
    match args.first() {
        Some(key) => {
            let key = key.to_string();
            items.sort_by(|a, b| {
                a.attr(&key)
                    .compare(&b.attr(&key))
                    .unwrap_or(Ordering::Equal)
            });
        }
        None => items.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal)),
    }
    Ok(Value::from(items))
}

pub(super) fn append(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    text(format!("{subject}{}", arg(args, 0)))
}

pub(super) fn prepend(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    text(format!("{}{subject}", arg(args, 0)))
}

pub(super) fn replace(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let from = arg(args, 0).to_string();
    let to = arg(args, 1).to_string();
    let s = subject.to_string();
    text(if from.is_empty() { s } else { s.replace(&from, &to) })
}

pub(super) fn remove(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let needle = arg(args, 0).to_string();
    let s = subject.to_string();
    text(if needle.is_empty() { s } else { s.replace(&needle, "") })
}

pub(super) fn escape(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(html_escape::encode_safe(&subject.to_string()))
}

pub(super) fn url_encode(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(utf8_percent_encode(&subject.to_string(), NON_ALPHANUMERIC).to_string())
}

pub(super) fn jsonify(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    serde_json::to_string(&subject.to_json())
        .map(Value::from)
        .map_err(|e| RenderError::eval(format!("jsonify: {e}")))
}

pub(super) fn plus(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    arithmetic(BinaryOp::Add, &subject, &arg(args, 0))
}

pub(super) fn minus(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    arithmetic(BinaryOp::Sub, &subject, &arg(args, 0))
}

pub(super) fn times(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    arithmetic(BinaryOp::Mul, &subject, &arg(args, 0))
}

pub(super) fn divided_by(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    arithmetic(BinaryOp::Div, &subject, &arg(args, 0))
}

/// `slice: start, length`; a negative start counts from the end.
pub(super) fn slice(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let start = arg(args, 0).to_int();
    let length = args.get(1).map_or(1, Value::to_int).max(0);

    let window = |len: usize| {
        let len_i = i64::try_from(len).unwrap_or(i64::MAX);
        let from = if start < 0 { (len_i + start).max(0) } else { start.min(len_i) };
        let to = from.saturating_add(length).min(len_i);
        (
            usize::try_from(from).unwrap_or(0),
            usize::try_from(to).unwrap_or(0),
        )
    };

    Ok(match subject {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = window(chars.len());
            Value::from(chars[from..to].iter().collect::<String>())
        }
        other => {
            let items = other.to_list();
            let (from, to) = window(items.len());
            Value::from(items[from..to].to_vec())
        }
    })
}

/// Substitute the first argument for null, `false` and empty strings.
pub(super) fn default(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    Ok(if subject.is_blank() {
        arg(args, 0)
    } else {
        subject
    })
}

pub(super) fn sha1(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(hex::encode(Sha1::digest(subject.to_string().as_bytes())))
}

pub(super) fn strip_html(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    if subject.is_null() {
        return text("");
    }
    text(strip_tags(&subject.to_string()))
}

/// `truncatewords: count, ellipsis`.
///
/// Words and the separator runs between them both count as tokens, so
/// `"a, b c" | truncatewords: 3` keeps `"a, b"`.
pub(super) fn truncatewords(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let count = args.first().and_then(Value::to_int_opt).unwrap_or(10);
    let ellipsis = args
        .get(1)
        .and_then(Value::to_text_opt)
        .unwrap_or_else(|| "...".to_owned());
    let count = usize::try_from(count).unwrap_or(0);

    let s = subject.to_string();
    let mut tokens = Vec::new();
    let mut last = 0;
    for separator in NON_WORD.find_iter(&s) {
        if separator.start() > last {
            tokens.push(&s[last..separator.start()]);
        }
        tokens.push(separator.as_str());
        last = separator.end();
    }
    if last < s.len() {
        tokens.push(&s[last..]);
    }

    let mut out: String = tokens.into_iter().take(count).collect();
    out.push_str(&ellipsis);
    text(out)
}

pub(super) fn slugify(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(NON_WORD.replace_all(&subject.to_string(), "-"))
}

pub(super) fn xml_escape(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(html_escape::encode_safe(&subject.to_string()))
}

pub(super) fn markdown(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    text(landing_storage::markdown_to_html(&subject.to_string()))
}

/// First 200 characters, cleaned against the HTML allowlist.
pub(super) fn excerpt(_: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    let s = subject.to_string();
    let head: String = s.chars().take(EXCERPT_CHARS).collect();
    text(clean_html(&head))
}

/// `where_exp: "item", "item.tags contains 'x'"`.
///
/// The predicate is evaluated once per item with the item bound in a child
/// frame. With a single argument the item is bound to `it`.
pub(super) fn where_exp(ctx: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let (name, predicate) = match args {
        [] => return Err(RenderError::eval("where_exp needs a predicate")),
        [predicate] => ("it".to_owned(), predicate.to_string()),
        [name, .., predicate] => (name.to_string(), predicate.to_string()),
    };

    let mut kept = Vec::new();
    for item in subject.to_list() {
        let vars = Map::from([(name.clone(), item.clone())]);
        if ctx.with_frame(vars, |ctx| ctx.eval_str(&predicate))?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::from(kept))
}

/// `where: "key", value`; without a value keeps items whose key is truthy.
pub(super) fn where_(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let key = arg(args, 0).to_string();
    let wanted = args.get(1);
    Ok(subject
        .to_list()
        .into_iter()
        .filter(|item| {
            let value = item.attr(&key);
            match wanted {
                Some(wanted) => value.loose_eq(wanted) || value.contains(wanted),
                None => value.is_truthy(),
            }
        })
        .collect())
}

/// `map: "key"` collects one attribute from every item.
pub(super) fn map(_: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let key = arg(args, 0).to_string();
    Ok(subject.to_list().iter().map(|item| item.attr(&key)).collect())
}

/// Render the subject as a template sharing the current scope.
///
/// Errors render as `--ERROR--` so a broken snippet in content does not
/// take the page down. Halts still propagate.
pub(super) fn eval_template(ctx: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    let source = subject.to_string();
    match ctx.render_str("eval_template", &source) {
        Ok(out) => text(out),
        Err(RenderError::Halt(flow)) => Err(RenderError::Halt(flow)),
        Err(RenderError::Template(e)) => {
            warn!(error = %e, "eval_template failed");
            text("--ERROR--")
        }
    }
}
