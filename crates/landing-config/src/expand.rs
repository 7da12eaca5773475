//! `${VAR}` expansion for string settings.

use crate::ConfigError;

/// Expand environment variable references in `value`.
///
/// `${VAR}` must be set; `${VAR:-fallback}` uses the fallback when it is not.
/// Strings without `${` are returned as-is, so a bare `$VAR` stays literal.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, UnsetVar> {
        std::env::var(var).map(Some).map_err(|_| UnsetVar {
            name: var.to_owned(),
        })
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.name),
    })
}

/// Lookup failure carrying the variable name.
struct UnsetVar {
    name: String,
}
