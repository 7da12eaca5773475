//! Filters and functions available to every template.

pub mod dates;
mod filters;
pub mod sanitize;

use crate::context::Context;
use crate::error::RenderError;
use crate::registry::Registry;
use crate::value::Value;

pub(crate) fn register(registry: Registry) -> Registry {
    registry
        .with_filter("upper", filters::upper)
        .with_filter("upcase", filters::upper)
        .with_filter("lower", filters::lower)
        .with_filter("downcase", filters::lower)
        .with_filter("capitalize", filters::capitalize)
        .with_filter("strip", filters::strip)
        .with_filter("size", filters::size)
        .with_filter("length", filters::size)
        .with_filter("first", filters::first)
        .with_filter("last", filters::last)
        .with_filter("join", filters::join)
        .with_filter("split", filters::split)
        .with_filter("reverse", filters::reverse)
        .with_filter("sort", filters::sort)
        .with_filter("append", filters::append)
        .with_filter("prepend", filters::prepend)
        .with_filter("replace", filters::replace)
        .with_filter("remove", filters::remove)
        .with_filter("escape", filters::escape)
        .with_filter("url_encode", filters::url_encode)
        .with_filter("jsonify", filters::jsonify)
        .with_filter("plus", filters::plus)
        .with_filter("minus", filters::minus)
        .with_filter("times", filters::times)
        .with_filter("divided_by", filters::divided_by)
        .with_filter("slice", filters::slice)
        .with_filter("default", filters::default)
        .with_filter("sha1", filters::sha1)
        .with_filter("strip_html", filters::strip_html)
        .with_filter("truncatewords", filters::truncatewords)
        .with_filter("slugify", filters::slugify)
        .with_filter("xml_escape", filters::xml_escape)
        .with_filter("markdown_to_html", filters::markdown)
        .with_filter("markdownify", filters::markdown)
        .with_filter("excerpt", filters::excerpt)
        .with_filter("where_exp", filters::where_exp)
        .with_filter("where", filters::where_)
        .with_filter("map", filters::map)
        .with_filter("eval_template", filters::eval_template)
        .with_filter("date", dates::date)
        .with_filter("date_format", dates::date)
        .with_filter("date_rfc3339", dates::date_rfc3339)
        .with_filter("date_to_xmlschema", dates::date_rfc3339)
        .with_filter("date_to_string", dates::date_to_string)
        .with_function("now", dates::now)
        .with_function("range", range)
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`; the end
/// is exclusive.
fn range(_: &mut Context<'_>, args: &[Value]) -> Result<Value, RenderError> {
    let (start, end, step) = match args {
        [end] => (0, end.to_int(), 1),
        [start, end] => (start.to_int(), end.to_int(), 1),
        [start, end, step, ..] => (start.to_int(), end.to_int(), step.to_int()),
        [] => return Err(RenderError::eval("range needs an end")),
    };
    if step == 0 {
        return Err(RenderError::eval("range step cannot be zero"));
    }
    let step_size = usize::try_from(step.unsigned_abs()).unwrap_or(usize::MAX);
    let values: Vec<Value> = if step > 0 {
        (start..end).step_by(step_size).map(Value::Int).collect()
    } else {
        (end + 1..=start).rev().step_by(step_size).map(Value::Int).collect()
    };
    Ok(Value::from(values))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::error::{Flow, RenderError};
    use crate::provider::MemoryProvider;
    use crate::value::{Map, Value};
    use crate::{Registry, Templates};

    fn templates() -> Templates {
        Templates::new(
            Arc::new(MemoryProvider::new()),
            Arc::new(MemoryProvider::new()),
            Arc::new(MemoryProvider::new()),
            Registry::with_builtins(),
        )
    }

    fn render_with(source: &str, vars: Map) -> String {
        templates().render_str(source, vars).unwrap()
    }

    fn render(source: &str) -> String {
        render_with(source, Map::new())
    }

    #[test]
    fn test_default_replaces_blank_values_only() {
        assert_eq!(render("{{ nothing | default: 'x' }}"), "x");
        assert_eq!(render("{{ false | default: 'x' }}"), "x");
        assert_eq!(render("{{ '' | default('x') }}"), "x");
        assert_eq!(render("{{ 0 | default: 'x' }}"), "0");
    }

    #[test]
    fn test_sha1_hex() {
        assert_eq!(
            render("{{ 'abc' | sha1 }}"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_truncatewords_counts_separators() {
        assert_eq!(
            render("{{ 'one two three four' | truncatewords: 3 }}"),
            "one two..."
        );
        assert_eq!(
            render("{{ 'one, two' | truncatewords: 10, '!' }}"),
            "one, two!"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(render("{{ 'Hello, World!' | slugify }}"), "Hello-World-");
    }

    #[test]
    fn test_strip_html_and_escape() {
        assert_eq!(render("{{ '<b>a</b> &amp; b' | strip_html }}"), "a & b");
        assert_eq!(render("{{ '<a & b>' | xml_escape }}"), "&lt;a &amp; b&gt;");
    }

    #[test]
    fn test_excerpt_truncates_and_closes_tags() {
        let body = format!("<p>{}</p>", "x".repeat(300));
        let vars = Map::from([("body".to_owned(), Value::from(body))]);

        let out = render_with("{{ body | excerpt }}", vars);
        assert_eq!(out, format!("<p>{}</p>", "x".repeat(197)));
    }

    #[test]
    fn test_markdown_filters() {
        assert_eq!(render("{{ '*hi*' | markdownify }}"), "<p><em>hi</em></p>\n");
    }

    #[test]
    fn test_where_exp_binds_item_name() {
        let posts = Value::from(vec![
            Value::from(Map::from([("n".to_owned(), Value::Int(1))])),
            Value::from(Map::from([("n".to_owned(), Value::Int(5))])),
        ]);
        let vars = Map::from([("posts".to_owned(), posts)]);

        let out = render_with(
            "{% for p in posts | where_exp: 'post', 'post.n > 2' %}{{ p.n }}{% endfor %}",
            vars.clone(),
        );
        assert_eq!(out, "5");

        let out = render_with(
            "{{ posts | where_exp: 'it.n < 2' | size }}",
            vars,
        );
        assert_eq!(out, "1");
    }

    #[test]
    fn test_eval_template_shares_scope_and_reports_errors() {
        let vars = Map::from([
            ("name".to_owned(), Value::from("Ada")),
            ("snippet".to_owned(), Value::from("Hi {{ name }}")),
            ("broken".to_owned(), Value::from("{% if %}")),
        ]);

        assert_eq!(render_with("{{ snippet | eval_template }}", vars.clone()), "Hi Ada");
        assert_eq!(render_with("{{ broken | eval_template }}", vars), "--ERROR--");
    }

    #[test]
    fn test_collection_filters() {
        assert_eq!(render("{{ [3, 1, 2] | sort | join: ',' }}"), "1,2,3");
        assert_eq!(render("{{ 'a,b,c' | split: ',' | reverse | join }}"), "c b a");
        assert_eq!(render("{{ [1, 2, 3, 4] | slice: 1, 2 | join: '' }}"), "23");
        assert_eq!(render("{{ 'hello' | slice: -3, 2 }}"), "ll");
        assert_eq!(render("{{ [1, 2] | first }}{{ [1, 2] | last }}"), "12");
        assert_eq!(render("{{ {a: [1, 'x']} | jsonify }}"), r#"{"a":[1,"x"]}"#);
    }

    #[test]
    fn test_string_and_math_filters() {
        assert_eq!(render("{{ 'ab' | upcase | append: 'c' | prepend: '>' }}"), ">ABc");
        assert_eq!(render("{{ 'hello' | capitalize }}"), "Hello");
        assert_eq!(render("{{ 'a b' | url_encode }}"), "a%20b");
        assert_eq!(render("{{ 'a-b-a' | replace: 'a', 'x' | remove: '-' }}"), "xbx");
        assert_eq!(render("{{ 2 | plus: 3 | times: 2 | minus: 1 }}"), "9");
        assert_eq!(render("{{ 1.5 | plus: 1 }}"), "2.5");
    }

    #[test]
    fn test_date_filters() {
        assert_eq!(render("{{ '2020-07-22' | date: 'dd MMM yyyy' }}"), "22 Jul 2020");
        assert_eq!(render("{{ '2020-07-22' | date: '%Y/%m' }}"), "2020/07");
        assert_eq!(render("{{ '2020-07-22' | date }}"), "2020-07-22");
        assert_eq!(
            render("{{ '22 Jul 2020 10:30' | date_to_xmlschema }}"),
            "2020-07-22T10:30:00Z"
        );
        assert_eq!(render("{{ 'garbage' | date_rfc3339 }}"), "1970-01-01T00:00:00Z");
        assert_eq!(render("{{ '2020-07-22' | date_to_string }}"), "22 Jul 2020");
    }

    #[test]
    fn test_range_function() {
        assert_eq!(render("{{ range(3) | join: ',' }}"), "0,1,2");
        assert_eq!(render("{{ range(1, 7, 3) | join: ',' }}"), "1,4");
        assert_eq!(render("{{ range(3, 0, -1) | join: ',' }}"), "3,2,1");
    }

    #[test]
    fn test_where_and_map() {
        let items = Value::from(vec![
            Value::from(Map::from([
                ("kind".to_owned(), Value::from("a")),
                ("id".to_owned(), Value::Int(1)),
            ])),
            Value::from(Map::from([
                ("kind".to_owned(), Value::from("b")),
                ("id".to_owned(), Value::Int(2)),
            ])),
        ]);
        let vars = Map::from([("items".to_owned(), items)]);

        let out = render_with("{{ items | where: 'kind', 'b' | map: 'id' | join }}", vars);
        assert_eq!(out, "2");
    }

    #[test]
    fn test_unknown_function() {
        let err = templates().render_str("{{ nope() }}", Map::new()).unwrap_err();
        assert!(!matches!(err, RenderError::Halt(Flow::NotFound)));
        assert_eq!(err.to_string(), "unknown function: nope");
    }
}
