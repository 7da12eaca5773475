//! Template loading, caching and rendering.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use landing_storage::{markdown_to_html, split_front_matter};
use tracing::debug;

use crate::context::Context;
use crate::error::{RenderError, TemplateError};
use crate::node::{self, Node};
use crate::provider::{ContentType, TemplateProvider, TemplateSource};
use crate::registry::Registry;
use crate::value::{Map, Value, yaml_map};

/// A parsed template.
#[derive(Debug)]
pub struct Template {
    name: String,
    front_matter: Map,
    content_type: Option<ContentType>,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse a template, splitting off its YAML front matter.
    ///
    /// A `content_type` key in the front matter overrides the type implied
    /// by the source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for malformed front matter or
    /// template syntax.
    pub fn parse(
        name: &str,
        source: &TemplateSource,
        registry: &Registry,
    ) -> Result<Self, TemplateError> {
        let (header, body) = split_front_matter(&source.text);
        let front_matter = match header {
            Some(header) if !header.trim().is_empty() => parse_front_matter(name, header)?,
            _ => Map::new(),
        };
        let content_type = front_matter
            .get("content_type")
            .and_then(|v| ContentType::from_name(&v.to_string()))
            .or(source.content_type);
        let nodes = node::parse(body, name, registry)?;

        Ok(Self {
            name: name.to_owned(),
            front_matter,
            content_type,
            nodes,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn front_matter(&self) -> &Map {
        &self.front_matter
    }

    /// Layout named in front matter.
    #[must_use]
    pub fn layout(&self) -> Option<&str> {
        match self.front_matter.get("layout") {
            Some(Value::String(layout)) if !layout.is_empty() && layout != "none" => {
                Some(layout)
            }
            _ => None,
        }
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Convert rendered output according to the content type.
    pub(crate) fn post_process(&self, rendered: String) -> String {
        match self.content_type {
            Some(ContentType::Markdown) => markdown_to_html(&rendered),
            Some(ContentType::Xml) | None => rendered,
        }
    }
}

fn parse_front_matter(name: &str, header: &str) -> Result<Map, TemplateError> {
    let error = |message: String| TemplateError::Parse {
        template: name.to_owned(),
        line: 1,
        message,
    };
    match serde_yaml::from_str::<serde_yaml::Value>(header) {
        Ok(serde_yaml::Value::Mapping(mapping)) => Ok(yaml_map(&mapping)),
        Ok(serde_yaml::Value::Null) => Ok(Map::new()),
        Ok(_) => Err(error("front matter is not a mapping".to_owned())),
        Err(e) => Err(error(format!("invalid front matter: {e}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Root,
    Include,
    Layout,
}

/// Template engine: providers, registry and parsed-template cache.
///
/// Root templates are rendered by [`Templates::render`]; includes and
/// layouts are looked up from their own providers when referenced. Parsed
/// templates are cached until [`Templates::invalidate_cache`].
pub struct Templates {
    root: Arc<dyn TemplateProvider>,
    includes: Arc<dyn TemplateProvider>,
    layouts: Arc<dyn TemplateProvider>,
    registry: Registry,
    cache: RwLock<HashMap<(Kind, String), Arc<Template>>>,
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Templates {
    #[must_use]
    pub fn new(
        root: Arc<dyn TemplateProvider>,
        includes: Arc<dyn TemplateProvider>,
        layouts: Arc<dyn TemplateProvider>,
        registry: Registry,
    ) -> Self {
        Self {
            root,
            includes,
            layouts,
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Drop every cached template so the next render re-reads sources.
    pub fn invalidate_cache(&self) {
        self.cache.write().expect("template cache lock poisoned").clear();
        debug!("Template cache invalidated");
    }

    /// Render the root template `name` with `vars` as the outermost scope.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::NotFound`] if no root template matches,
    /// parse and evaluation errors, or [`RenderError::Halt`] when the
    /// template stops the render.
    pub fn render(&self, name: &str, vars: Map) -> Result<String, RenderError> {
        let template = self.load(Kind::Root, name)?;
        Context::new(self, Map::new()).render_template(&template, vars)
    }

    /// Render ad-hoc template source without caching it.
    ///
    /// # Errors
    ///
    /// Same as [`Templates::render`].
    pub fn render_str(&self, source: &str, vars: Map) -> Result<String, RenderError> {
        Context::new(self, vars).render_str("<string>", source)
    }

    /// Evaluate a single expression with `vars` as the outermost scope.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed expressions and any evaluation
    /// error, including halts raised by functions.
    pub fn eval_str(&self, source: &str, vars: Map) -> Result<Value, RenderError> {
        Context::new(self, vars).eval_str(source)
    }

    pub(crate) fn include(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        self.load(Kind::Include, name)
    }

    pub(crate) fn layout(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        self.load(Kind::Layout, name)
    }

    fn load(&self, kind: Kind, name: &str) -> Result<Arc<Template>, TemplateError> {
        let key = (kind, name.to_owned());
        if let Some(template) = self
            .cache
            .read()
            .expect("template cache lock poisoned")
            .get(&key)
        {
            return Ok(Arc::clone(template));
        }

        let provider = match kind {
            Kind::Root => &self.root,
            Kind::Include => &self.includes,
            Kind::Layout => &self.layouts,
        };
        let source = provider
            .get(name)?
            .ok_or_else(|| TemplateError::NotFound(name.to_owned()))?;
        let template = Arc::new(Template::parse(name, &source, &self.registry)?);
        debug!(template = name, kind = ?kind, "Template parsed");

        self.cache
            .write()
            .expect("template cache lock poisoned")
            .insert(key, Arc::clone(&template));
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Flow;
    use crate::provider::MemoryProvider;

    fn engine(root: MemoryProvider, includes: MemoryProvider, layouts: MemoryProvider) -> Templates {
        Templates::new(
            Arc::new(root),
            Arc::new(includes),
            Arc::new(layouts),
            Registry::with_builtins(),
        )
    }

    fn render(source: &str, vars: Map) -> String {
        engine(
            MemoryProvider::new().with("page", source),
            MemoryProvider::new(),
            MemoryProvider::new(),
        )
        .render("page", vars)
        .unwrap()
    }

    fn vars(pairs: &[(&str, Value)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_output_and_filters() {
        let out = render(
            "Hello {{ name | upcase }}! {{ 1 + 2 * 3 }}",
            vars(&[("name", Value::from("world"))]),
        );
        assert_eq!(out, "Hello WORLD! 7");
    }

    #[test]
    fn test_if_and_unless() {
        let source = "{% if n > 2 %}big{% elsif n > 0 %}small{% else %}none{% endif %}\
                      {% unless n %}!{% endunless %}";
        assert_eq!(render(source, vars(&[("n", Value::Int(5))])), "big");
        assert_eq!(render(source, vars(&[("n", Value::Int(1))])), "small");
        assert_eq!(render(source, vars(&[("n", Value::Int(0))])), "none!");
    }

    #[test]
    fn test_for_loop_variables_and_else() {
        let items = Value::from(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        let source = "{% for x in items limit: 2 %}{{ forloop.index }}{{ x }}{% if loop.last %}.{% else %},{% endif %}{% endfor %}\
                      {% for x in empty %}x{% else %}empty{% endfor %}";

        assert_eq!(render(source, vars(&[("items", items)])), "1a,2b.empty");
    }

    #[test]
    fn test_for_over_map_with_key() {
        let map = Value::from(vars(&[("a", Value::Int(1)), ("b", Value::Int(2))]));
        let out = render(
            "{% for k, v in m %}{{ k }}={{ v }};{% endfor %}",
            vars(&[("m", map)]),
        );
        assert_eq!(out, "a=1;b=2;");
    }

    #[test]
    fn test_assign_and_capture() {
        let out = render(
            "{% assign x = 'a' ~ 'b' %}{% capture y %}[{{ x }}]{% endcapture %}{{ y }}{{ y }}",
            Map::new(),
        );
        assert_eq!(out, "[ab][ab]");
    }

    #[test]
    fn test_front_matter_sets_variables_and_markdown_converts_after_tags() {
        let templates = engine(
            MemoryProvider::new().with("post.md", "---\nword: bold\n---\n**{{ word }}**"),
            MemoryProvider::new(),
            MemoryProvider::new(),
        );

        let out = templates.render("post.md", Map::new()).unwrap();
        assert_eq!(out, "<p><strong>bold</strong></p>\n");
    }

    #[test]
    fn test_layout_chain_receives_content() {
        let templates = engine(
            MemoryProvider::new().with("page", "---\nlayout: post\ntitle: Hi\n---\nbody"),
            MemoryProvider::new(),
            MemoryProvider::new()
                .with("post.html", "---\nlayout: base\n---\n<article>{{ content }}</article>")
                .with("base.html", "<title>{{ title }}</title>{{ content }}"),
        );

        let out = templates.render("page", Map::new()).unwrap();
        assert_eq!(out, "<title>Hi</title><article>body</article>");
    }

    #[test]
    fn test_include_with_params() {
        let templates = engine(
            MemoryProvider::new().with(
                "page",
                "{% include card.html title='A' %}|{% include name n=2 %}",
            ),
            MemoryProvider::new()
                .with("card.html", "<b>{{ include.title }}</b>")
                .with("other.html", "n={{ n }}"),
            MemoryProvider::new(),
        );

        let out = templates
            .render("page", vars(&[("name", Value::from("other"))]))
            .unwrap();
        assert_eq!(out, "<b>A</b>|n=2");
    }

    #[test]
    fn test_missing_include_is_an_error() {
        let templates = engine(
            MemoryProvider::new().with("page", "{% include nope.html %}"),
            MemoryProvider::new(),
            MemoryProvider::new(),
        );

        let err = templates.render("page", Map::new()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Template(TemplateError::NotFound(name)) if name == "nope.html"
        ));
    }

    #[test]
    fn test_self_including_template_is_bounded() {
        let templates = engine(
            MemoryProvider::new().with("page", "{% include loop.html %}"),
            MemoryProvider::new().with("loop.html", "{% include loop.html %}"),
            MemoryProvider::new(),
        );

        let err = templates.render("page", Map::new()).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn test_unknown_filter() {
        let templates = engine(
            MemoryProvider::new().with("page", "{{ x | nope }}"),
            MemoryProvider::new(),
            MemoryProvider::new(),
        );
        let err = templates.render("page", Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "unknown filter: nope");
    }

    #[test]
    fn test_cache_and_invalidation() {
        let templates = engine(
            MemoryProvider::new().with("page", "x"),
            MemoryProvider::new(),
            MemoryProvider::new(),
        );

        templates.render("page", Map::new()).unwrap();
        assert_eq!(templates.cache.read().unwrap().len(), 1);

        templates.invalidate_cache();
        assert!(templates.cache.read().unwrap().is_empty());
    }

    #[derive(Debug)]
    struct StopNode;

    impl crate::TagNode for StopNode {
        fn render(&self, _: &mut Context<'_>, _: &mut String) -> Result<(), RenderError> {
            Err(RenderError::Halt(Flow::NotFound))
        }
    }

    struct StopTag;

    impl crate::Tag for StopTag {
        fn name(&self) -> &str {
            "stop"
        }

        fn compile(
            &self,
            _: &str,
            _: crate::Block,
        ) -> Result<Arc<dyn crate::TagNode>, String> {
            Ok(Arc::new(StopNode))
        }
    }

    #[test]
    fn test_halt_unwinds_through_layouts() {
        let templates = Templates::new(
            Arc::new(MemoryProvider::new().with("page", "---\nlayout: base\n---\n{% stop %}")),
            Arc::new(MemoryProvider::new()),
            Arc::new(MemoryProvider::new().with("base.html", "{{ content }}")),
            Registry::with_builtins().with_tag(StopTag),
        );

        let err = templates.render("page", Map::new()).unwrap_err();
        assert!(matches!(err, RenderError::Halt(Flow::NotFound)));
    }

    #[test]
    fn test_render_str_does_not_cache() {
        let templates = engine(MemoryProvider::new(), MemoryProvider::new(), MemoryProvider::new());

        let out = templates
            .render_str("{{ a }}-{{ b }}", vars(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
            .unwrap();
        assert_eq!(out, "1-2");
        assert!(templates.cache.read().unwrap().is_empty());
    }

    #[test]
    fn test_eval_str_returns_values() {
        let templates = engine(MemoryProvider::new(), MemoryProvider::new(), MemoryProvider::new());
        let items = Value::from(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let value = templates
            .eval_str("items | where_exp: 'i', 'i > 1'", vars(&[("items", items)]))
            .unwrap();
        assert_eq!(value.len(), 2);
    }
}
