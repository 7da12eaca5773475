//! Date auto-detection, parsing and formatting.
//!
//! Free-form date strings from front matter are matched against a fixed,
//! ordered table of shapes. Formatting accepts either strftime patterns
//! (`%Y-%m-%d`) or Java-style patterns (`yyyy-MM-dd`), since both show up in
//! site templates.

use std::sync::LazyLock;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::{Captures, Regex};

use crate::context::Context;
use crate::error::RenderError;
use crate::value::Value;

const COMPACT_DATE: &str = r"(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})";

/// Separated date forms, in detection order.
const DATE_FORMS: [(&str, &str); 6] = [
    (r"(?P<d>\d{1,2})-(?P<m>\d{1,2})-(?P<y>\d{4})", "dd-MM-yyyy"),
    (r"(?P<y>\d{4})-(?P<m>\d{1,2})-(?P<d>\d{1,2})", "yyyy-MM-dd"),
    (r"(?P<m>\d{1,2})/(?P<d>\d{1,2})/(?P<y>\d{4})", "MM/dd/yyyy"),
    (r"(?P<y>\d{4})/(?P<m>\d{1,2})/(?P<d>\d{1,2})", "yyyy/MM/dd"),
    (r"(?P<d>\d{1,2})\s(?P<mon>[a-z]{3})\s(?P<y>\d{4})", "dd MMM yyyy"),
    (r"(?P<d>\d{1,2})\s(?P<mon>[a-z]{4,})\s(?P<y>\d{4})", "dd MMMM yyyy"),
];

const HOURS_MINUTES: &str = r"\s(?P<H>\d{1,2}):(?P<M>\d{2})";
const SECONDS: &str = r":(?P<S>\d{2})";

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

struct DateShape {
    regex: Regex,
    format: String,
}

static SHAPES: LazyLock<Vec<DateShape>> = LazyLock::new(|| {
    let shape = |pattern: &str, format: &str| DateShape {
        regex: Regex::new(&["^", pattern, "$"].concat()).expect("valid date pattern"),
        format: format.to_owned(),
    };

    let mut shapes = vec![shape(COMPACT_DATE, "yyyyMMdd")];
    shapes.extend(DATE_FORMS.iter().map(|&(re, f)| shape(re, f)));

    shapes.push(shape(
        &[COMPACT_DATE, r"(?P<H>\d{2})(?P<M>\d{2})"].concat(),
        "yyyyMMddHHmm",
    ));
    shapes.push(shape(
        &[COMPACT_DATE, r"\s(?P<H>\d{2})(?P<M>\d{2})"].concat(),
        "yyyyMMdd HHmm",
    ));
    shapes.extend(
        DATE_FORMS
            .iter()
            .map(|&(re, f)| shape(&[re, HOURS_MINUTES].concat(), &format!("{f} HH:mm"))),
    );

    shapes.push(shape(
        &[COMPACT_DATE, r"(?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})"].concat(),
        "yyyyMMddHHmmss",
    ));
    shapes.push(shape(
        &[COMPACT_DATE, r"\s(?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})"].concat(),
        "yyyyMMdd HHmmss",
    ));
    shapes.extend(DATE_FORMS.iter().map(|&(re, f)| {
        shape(
            &[re, HOURS_MINUTES, SECONDS].concat(),
            &format!("{f} HH:mm:ss"),
        )
    }));

    shapes
});

/// Format of the first shape `input` matches, as a Java-style pattern.
///
/// Matching is case-insensitive. Returns `None` when nothing matches.
#[must_use]
pub fn determine_date_format(input: &str) -> Option<&'static str> {
    let lower = input.trim().to_lowercase();
    SHAPES
        .iter()
        .find(|shape| shape.regex.is_match(&lower))
        .map(|shape| shape.format.as_str())
}

/// Parse a date in any detected shape, falling back to RFC 3339 and
/// `YYYY-MM-DD HH:MM:SS ±ZZZZ`. Times are taken as UTC.
#[must_use]
pub fn parse_any_date(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();
    if let Some(captures) = SHAPES.iter().find_map(|shape| shape.regex.captures(&lower)) {
        return from_captures(&captures);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S %z"))
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

fn from_captures(captures: &Captures<'_>) -> Option<DateTime<Utc>> {
    let number = |name: &str| -> Option<u32> {
        captures
            .name(name)
            .map_or(Some(0), |m| m.as_str().parse().ok())
    };

    let year = captures.name("y")?.as_str().parse().ok()?;
    let month = match captures.name("mon") {
        Some(name) => {
            let prefix = name.as_str().get(..3)?;
            let index = MONTHS.iter().position(|m| *m == prefix)?;
            u32::try_from(index).ok()? + 1
        }
        None => number("m")?,
    };
    let day = number("d")?;

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(number("H")?, number("M")?, number("S")?)
        .map(|naive| naive.and_utc())
}

/// Date view of a template value: dates as is, strings parsed, `"now"` and
/// `"today"` as the current time.
#[must_use]
pub fn to_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(date) => Some(*date),
        Value::Int(seconds) => DateTime::from_timestamp(*seconds, 0),
        Value::Null => None,
        other => {
            let text = other.to_string();
            match text.trim() {
                "now" | "today" => Some(Utc::now()),
                text => parse_any_date(text),
            }
        }
    }
}

/// Format `date` with a strftime or Java-style pattern.
///
/// Returns `None` when the pattern contains an invalid strftime specifier.
#[must_use]
pub fn format_date(date: &DateTime<Utc>, pattern: &str) -> Option<String> {
    let strftime = if pattern.contains('%') {
        pattern.to_owned()
    } else {
        java_to_strftime(pattern)
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(&strftime).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.iter()).to_string())
}

/// Translate a Java `SimpleDateFormat` pattern into strftime.
fn java_to_strftime(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // Quoted literal; `''` is a single quote.
            i += 1;
            if chars.get(i) == Some(&'\'') {
                out.push('\'');
                i += 1;
                continue;
            }
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        out.push('\'');
                        i += 2;
                        continue;
                    }
                    break;
                }
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] == c {
            i += 1;
        }
        let count = i - start;
        let spec = match (c, count) {
            ('y' | 'Y' | 'u', 2) => "%y",
            ('y' | 'Y' | 'u', _) => "%Y",
            ('M' | 'L', 1) => "%-m",
            ('M' | 'L', 2) => "%m",
            ('M' | 'L', 3) => "%b",
            ('M' | 'L', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('D', _) => "%j",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('a', _) => "%p",
            ('z', _) => "%Z",
            ('Z', _) => "%z",
            ('X', _) => "%:z",
            _ => {
                for _ in 0..count {
                    out.push(c);
                }
                continue;
            }
        };
        out.push_str(spec);
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// `date` / `date_format`: no argument prints the subject as is.
pub(super) fn date(
    _: &mut Context<'_>,
    subject: Value,
    args: &[Value],
) -> Result<Value, RenderError> {
    let Some(pattern) = args.first() else {
        return Ok(Value::from(subject.to_string()));
    };
    let date = to_date(&subject).unwrap_or_else(epoch);
    format_date(&date, &pattern.to_string())
        .map(Value::from)
        .ok_or_else(|| RenderError::eval(format!("invalid date pattern `{pattern}`")))
}

/// `date_rfc3339` / `date_to_xmlschema`.
pub(super) fn date_rfc3339(
    _: &mut Context<'_>,
    subject: Value,
    _: &[Value],
) -> Result<Value, RenderError> {
    let date = to_date(&subject).unwrap_or_else(epoch);
    Ok(Value::from(date.to_rfc3339_opts(SecondsFormat::Secs, true)))
}

/// `date_to_string`, `dd MMM yyyy` unless a pattern is given.
pub(super) fn date_to_string(
    _: &mut Context<'_>,
    subject: Value,
    args: &[Value],
) -> Result<Value, RenderError> {
    let date = to_date(&subject).unwrap_or_else(epoch);
    let pattern = args
        .first()
        .map_or_else(|| "dd MMM yyyy".to_owned(), ToString::to_string);
    let text = format_date(&date, &pattern)
        .unwrap_or_else(|| date.to_rfc3339_opts(SecondsFormat::Secs, true));
    Ok(Value::from(text))
}

pub(super) fn now(_: &mut Context<'_>, _: &[Value]) -> Result<Value, RenderError> {
    Ok(Value::Date(Utc::now()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_detects_formats_in_table_order() {
        assert_eq!(determine_date_format("2020-07-22"), Some("yyyy-MM-dd"));
        assert_eq!(determine_date_format("22 Jul 2020"), Some("dd MMM yyyy"));
        assert_eq!(determine_date_format("22 July 2020"), Some("dd MMMM yyyy"));
        assert_eq!(determine_date_format("20200722"), Some("yyyyMMdd"));
        assert_eq!(determine_date_format("202007221030"), Some("yyyyMMddHHmm"));
        assert_eq!(
            determine_date_format("07/22/2020 10:30:15"),
            Some("MM/dd/yyyy HH:mm:ss")
        );
        assert_eq!(determine_date_format("yesterday-ish"), None);
    }

    #[test]
    fn test_parse_any_date_shapes() {
        assert_eq!(parse_any_date("2020-07-22"), Some(utc(2020, 7, 22, 0, 0, 0)));
        assert_eq!(parse_any_date("22 Jul 2020"), Some(utc(2020, 7, 22, 0, 0, 0)));
        assert_eq!(parse_any_date("3 September 2019"), Some(utc(2019, 9, 3, 0, 0, 0)));
        assert_eq!(
            parse_any_date("22-07-2020 9:05"),
            Some(utc(2020, 7, 22, 9, 5, 0))
        );
        assert_eq!(
            parse_any_date("20200722 103015"),
            Some(utc(2020, 7, 22, 10, 30, 15))
        );
    }

    #[test]
    fn test_parse_any_date_rejects_impossible_and_unknown() {
        assert_eq!(parse_any_date("2020-13-01"), None);
        assert_eq!(parse_any_date("31 Foo 2020"), None);
        assert_eq!(parse_any_date("soon"), None);
    }

    #[test]
    fn test_parse_any_date_rfc3339_fallback() {
        assert_eq!(
            parse_any_date("2020-07-22T10:00:00+02:00"),
            Some(utc(2020, 7, 22, 8, 0, 0))
        );
        assert_eq!(
            parse_any_date("2020-07-22 10:00:00 +0000"),
            Some(utc(2020, 7, 22, 10, 0, 0))
        );
    }

    #[test]
    fn test_java_patterns() {
        let date = utc(2020, 7, 2, 15, 4, 5);

        assert_eq!(format_date(&date, "dd MMM yyyy").unwrap(), "02 Jul 2020");
        assert_eq!(format_date(&date, "MMMM d, yyyy").unwrap(), "July 2, 2020");
        assert_eq!(format_date(&date, "yyyy-MM-dd'T'HH:mm:ss").unwrap(), "2020-07-02T15:04:05");
        assert_eq!(format_date(&date, "EEE, hh a").unwrap(), "Thu, 03 PM");
        assert_eq!(format_date(&date, "'100%' yy").unwrap(), "100% 20");
    }

    #[test]
    fn test_strftime_patterns() {
        let date = utc(2020, 7, 2, 0, 0, 0);

        assert_eq!(format_date(&date, "%B %d, %Y").unwrap(), "July 02, 2020");
        assert_eq!(format_date(&date, "%Q"), None);
    }

    #[test]
    fn test_to_date() {
        assert_eq!(to_date(&Value::from("2020-07-22")), Some(utc(2020, 7, 22, 0, 0, 0)));
        assert_eq!(to_date(&Value::Int(0)), Some(epoch()));
        assert_eq!(to_date(&Value::Null), None);
        assert!(to_date(&Value::from("now")).is_some());
    }
}
