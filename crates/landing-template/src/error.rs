//! Template errors and render control flow.

/// Error raised while parsing or evaluating a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Syntax error in a template.
    #[error("{template}:{line}: {message}")]
    Parse {
        /// Template name.
        template: String,
        /// 1-based line of the offending tag or expression.
        line: usize,
        message: String,
    },
    /// No provider returned a template for this name.
    #[error("template not found: {0}")]
    NotFound(String),
    /// Filter name not registered.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
    /// Function name not registered.
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    /// Evaluation failed.
    #[error("{0}")]
    Eval(String),
    /// I/O error in a provider, tag or filter.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Signal that stops the current render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// The page does not exist.
    NotFound,
    /// The page lives elsewhere.
    Redirect {
        /// Target URL.
        url: String,
        /// `true` for a permanent (301) redirect.
        permanent: bool,
    },
}

/// Result of a failed render.
///
/// [`RenderError::Halt`] is control flow raised by templates and unwinds only
/// the render it was raised in. [`RenderError::Template`] is a real failure.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render halted: {0:?}")]
    Halt(Flow),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl RenderError {
    /// Shorthand for an evaluation error.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Template(TemplateError::Eval(message.into()))
    }
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        Self::Template(TemplateError::Io(e))
    }
}
