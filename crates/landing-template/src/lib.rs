//! Template engine for Landing.
//!
//! A Liquid/Twig-flavoured language with front matter:
//!
//! ```text
//! ---
//! layout: post
//! ---
//! {% for post in site.posts limit: 3 %}
//!   <a href="{{ post.url | absolute }}">{{ post.title | default: "Untitled" }}</a>
//! {% endfor %}
//! ```
//!
//! [`Templates`] resolves root templates, includes and layouts through
//! [`TemplateProvider`]s and caches parsed [`Template`]s until
//! [`Templates::invalidate_cache`]. Filters, functions and custom tags are
//! registered on a [`Registry`]; they receive the render [`Context`] so they
//! can read variables or evaluate nested templates. A render stops early
//! with [`RenderError::Halt`] when a template signals not-found or a
//! redirect.

mod builtins;
mod context;
mod engine;
mod error;
mod expr;
mod lexer;
mod node;
mod provider;
mod registry;
mod scope;
mod value;

pub use builtins::dates::{determine_date_format, format_date, parse_any_date, to_date};
pub use builtins::sanitize::{clean_html, strip_html};
pub use context::Context;
pub use engine::{Template, Templates};
pub use error::{Flow, RenderError, TemplateError};
pub use node::Block;
pub use provider::{ContentType, DirProvider, MemoryProvider, TemplateProvider, TemplateSource};
pub use registry::{Filter, Function, Registry, Tag, TagNode};
pub use scope::Scope;
pub use value::{Map, Object, Value, yaml_map};
