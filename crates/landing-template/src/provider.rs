//! Template sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use landing_storage::{FileKind, Folders};

use crate::error::TemplateError;

/// How a template's rendered output is post-processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Rendered output is converted from Markdown to HTML.
    Markdown,
    /// Output is emitted as is.
    Xml,
}

impl ContentType {
    /// Content type implied by a file extension.
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        match FileKind::of(path) {
            FileKind::Markdown => Some(Self::Markdown),
            FileKind::Xml => Some(Self::Xml),
            FileKind::Html | FileKind::Other => None,
        }
    }

    /// Content type named in front matter (`content_type: markdown`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "markdown" | "md" | "kramdown" => Some(Self::Markdown),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

/// Raw template text with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub text: String,
    pub content_type: Option<ContentType>,
}

impl TemplateSource {
    #[must_use]
    pub fn new(text: impl Into<String>, content_type: Option<ContentType>) -> Self {
        Self {
            text: text.into(),
            content_type,
        }
    }
}

/// Resolves template names to sources.
pub trait TemplateProvider: Send + Sync {
    /// Source for `name`, or `None` when this provider has no such template.
    ///
    /// # Errors
    ///
    /// Returns an error when the template exists but cannot be read.
    fn get(&self, name: &str) -> Result<Option<TemplateSource>, TemplateError>;
}

/// Looks templates up in a list of directories.
///
/// For a name `card`, tries `card`, `card.md` and `card.html`, each in every
/// directory in order.
#[derive(Debug, Clone)]
pub struct DirProvider {
    dirs: Vec<PathBuf>,
}

impl DirProvider {
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl TemplateProvider for DirProvider {
    fn get(&self, name: &str) -> Result<Option<TemplateSource>, TemplateError> {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return Ok(None);
        }
        for candidate in [name.to_owned(), format!("{name}.md"), format!("{name}.html")] {
            for dir in &self.dirs {
                let Ok(path) = Folders::resolve_within(dir, &candidate) else {
                    tracing::debug!(template = name, "Rejected template path");
                    return Ok(None);
                };
                if path.is_file() {
                    let text = std::fs::read_to_string(&path)?;
                    return Ok(Some(TemplateSource::new(text, ContentType::of(&path))));
                }
            }
        }
        Ok(None)
    }
}

/// In-memory templates.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    templates: HashMap<String, TemplateSource>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template; the content type follows the name's extension.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        let content_type = ContentType::of(Path::new(&name));
        self.templates
            .insert(name, TemplateSource::new(text, content_type));
        self
    }
}

impl TemplateProvider for MemoryProvider {
    fn get(&self, name: &str) -> Result<Option<TemplateSource>, TemplateError> {
        let found = [name.to_owned(), format!("{name}.md"), format!("{name}.html")]
            .iter()
            .find_map(|candidate| self.templates.get(candidate))
            .cloned();
        Ok(found)
    }
}
