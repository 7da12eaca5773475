//! Stylesheet minification for `import_css`.

const STYLE_OPEN: &str = "<style>";
const STYLE_CLOSE: &str = "</style>";

/// Minify a stylesheet.
///
/// The CSS is minified as the body of a `<style>` element by `minify-html`,
/// which parses it, so strings and `url(...)` values keep their contents.
/// Input that cannot sit inside `<style>` is returned unchanged.
#[must_use]
pub fn compress_css(css: &str) -> String {
    if css.trim().is_empty() {
        return String::new();
    }
    if css.to_ascii_lowercase().contains(STYLE_CLOSE) {
        return css.to_owned();
    }

    let mut cfg = minify_html::Cfg::new();
    cfg.minify_css = true;
    cfg.keep_closing_tags = true;
    cfg.keep_comments = false;

    let html = [STYLE_OPEN, css, STYLE_CLOSE].concat();
    let minified = minify_html::minify(html.as_bytes(), &cfg);
    let minified = String::from_utf8_lossy(&minified);
    minified
        .trim()
        .strip_prefix(STYLE_OPEN)
        .and_then(|rest| rest.strip_suffix(STYLE_CLOSE))
        .map_or_else(|| css.trim().to_owned(), str::to_owned)
}
