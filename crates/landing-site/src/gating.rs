//! Sponsor-only and non-sponsor-only spans in rendered output.
//!
//! Rendered text may contain `$SPONSOR$:...$$` and `$NOSPONSOR$:...$$`
//! spans. The gate runs over the final text, so a span may start in one
//! template and end in another.

use std::sync::LazyLock;

use regex::Regex;

static SPONSOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$SPONSOR\$:(.*?)\$\$").expect("valid regex"));
static NO_SPONSOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$NOSPONSOR\$:(.*?)\$\$").expect("valid regex"));

/// Keep the spans meant for this viewer and drop the others, markers
/// included.
#[must_use]
pub fn apply_gate(text: &str, is_sponsor: bool) -> String {
    let text = gate(&SPONSOR, text, is_sponsor);
    gate(&NO_SPONSOR, &text, !is_sponsor)
}

fn gate(regex: &Regex, text: &str, keep: bool) -> String {
    let replacement = if keep { "$1" } else { "" };
    regex.replace_all(text, replacement).into_owned()
}
