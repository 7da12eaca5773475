//! Extension points: filters, functions and custom tags.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::RenderError;
use crate::node::Block;
use crate::value::Value;

/// A filter, applied as `subject | name(args)`.
pub trait Filter: Send + Sync {
    fn apply(
        &self,
        ctx: &mut Context<'_>,
        subject: Value,
        args: &[Value],
    ) -> Result<Value, RenderError>;
}

impl<F> Filter for F
where
    F: Fn(&mut Context<'_>, Value, &[Value]) -> Result<Value, RenderError> + Send + Sync,
{
    fn apply(
        &self,
        ctx: &mut Context<'_>,
        subject: Value,
        args: &[Value],
    ) -> Result<Value, RenderError> {
        self(ctx, subject, args)
    }
}

/// A function, called as `name(args)`.
pub trait Function: Send + Sync {
    fn call(&self, ctx: &mut Context<'_>, args: &[Value]) -> Result<Value, RenderError>;
}

impl<F> Function for F
where
    F: Fn(&mut Context<'_>, &[Value]) -> Result<Value, RenderError> + Send + Sync,
{
    fn call(&self, ctx: &mut Context<'_>, args: &[Value]) -> Result<Value, RenderError> {
        self(ctx, args)
    }
}

/// A custom `{% name args %}` tag.
pub trait Tag: Send + Sync {
    fn name(&self) -> &str;

    /// Closing tag name for block tags, `None` for single tags.
    fn end_tag(&self) -> Option<&str> {
        None
    }

    /// Build the node for one occurrence. `body` is empty for single tags.
    ///
    /// # Errors
    ///
    /// Returns a message when `args` is malformed; it is reported as a parse
    /// error at the tag's line.
    fn compile(&self, args: &str, body: Block) -> Result<Arc<dyn TagNode>, String>;
}

/// A compiled custom tag.
pub trait TagNode: fmt::Debug + Send + Sync {
    fn render(&self, ctx: &mut Context<'_>, out: &mut String) -> Result<(), RenderError>;
}

/// Named filters, functions and tags available to templates.
#[derive(Clone, Default)]
pub struct Registry {
    filters: HashMap<String, Arc<dyn Filter>>,
    functions: HashMap<String, Arc<dyn Function>>,
    tags: HashMap<String, Arc<dyn Tag>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort();
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        let mut tags: Vec<_> = self.tags.keys().collect();
        tags.sort();
        f.debug_struct("Registry")
            .field("filters", &filters)
            .field("functions", &functions)
            .field("tags", &tags)
            .finish()
    }
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in filters and functions.
    #[must_use]
    pub fn with_builtins() -> Self {
        crate::builtins::register(Self::new())
    }

    /// Add or replace a filter.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, filter: impl Filter + 'static) -> Self {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    /// Add or replace a function.
    #[must_use]
    pub fn with_function(
        mut self,
        name: impl Into<String>,
        function: impl Function + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Add or replace a tag, keyed by [`Tag::name`].
    #[must_use]
    pub fn with_tag(mut self, tag: impl Tag + 'static) -> Self {
        self.tags.insert(tag.name().to_owned(), Arc::new(tag));
        self
    }

    pub(crate) fn filter(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub(crate) fn function(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    pub(crate) fn tag(&self, name: &str) -> Option<&Arc<dyn Tag>> {
        self.tags.get(name)
    }
}
