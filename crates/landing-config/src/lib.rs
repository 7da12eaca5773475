//! Startup configuration for Landing.
//!
//! Parses `landing.toml` with serde and discovers it in the working
//! directory or any of its parents. Values from the command line are applied
//! on top through [`CliSettings`].
//!
//! This is the process-level configuration (where the content lives, where
//! to listen). The site's own YAML configuration (`config.yml`, `data/`,
//! `secrets.yml`) is owned by the site crate and reloaded with the content.
//!
//! ## Environment Variable Expansion
//!
//! String values support:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `content.dir`
//!
//! The default port is taken from the `VIRTUAL_PORT` environment variable
//! when it holds a valid port number.

mod expand;

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// Only `Some` fields override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override content directory.
    pub content_dir: Option<PathBuf>,
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override the reload loop enabled flag.
    pub watch_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "landing.toml";

/// Environment variable providing the default port.
const PORT_ENV: &str = "VIRTUAL_PORT";

/// Port used when neither the file nor `VIRTUAL_PORT` set one.
const DEFAULT_PORT: u16 = 8080;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Content configuration as written in TOML.
    content: ContentConfigRaw,
    /// Reload loop configuration.
    pub watch: WatchConfig,

    /// Resolved content configuration (set after loading).
    #[serde(skip)]
    pub content_resolved: ContentConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: port_from_env(std::env::var(PORT_ENV).ok().as_deref()),
        }
    }
}

/// Pick the default port from an optional `VIRTUAL_PORT` value.
fn port_from_env(value: Option<&str>) -> u16 {
    value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_PORT)
}

/// Content configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentConfigRaw {
    dir: Option<String>,
    cache_enabled: Option<bool>,
}

/// Resolved content configuration with absolute paths.
#[derive(Debug, Default)]
pub struct ContentConfig {
    /// Content root: entries, templates, static files and site config.
    pub content_dir: PathBuf,
    /// Whether the persistent cache is used.
    pub cache_enabled: bool,
}

impl ContentConfig {
    /// Persistent cache directory (`<content>/.cache`).
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.content_dir.join(".cache")
    }

    /// Static generation output directory (`<content>/_site`).
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.content_dir.join("_site")
    }
}

/// Reload loop configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Whether content changes trigger a reload.
    pub enabled: bool,
    /// Path fragments whose changes are ignored.
    pub ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore: vec![".cache".to_owned(), ".idea".to_owned()],
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`LANDING_HOST`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `landing.toml` in the current directory and its parents, falling
    /// back to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit `config_path` doesn't exist, parsing
    /// fails, or the loaded values are invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(content_dir) = &settings.content_dir {
            self.content_resolved.content_dir.clone_from(content_dir);
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.content_resolved.cache_enabled = cache_enabled;
        }
        if let Some(watch_enabled) = settings.watch_enabled {
            self.watch.enabled = watch_enabled;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to `base`.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            content: ContentConfigRaw::default(),
            watch: WatchConfig::default(),
            content_resolved: ContentConfig {
                content_dir: base.join("content"),
                cache_enabled: true,
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Validation(
                "server.host cannot be empty".to_owned(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        if self.watch.ignore.iter().any(String::is_empty) {
            return Err(ConfigError::Validation(
                "watch.ignore entries cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        if let Some(ref dir) = self.content.dir {
            self.content.dir = Some(expand::expand_env(dir, "content.dir")?);
        }
        Ok(())
    }

    /// Resolve relative paths against the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.content_resolved = ContentConfig {
            content_dir: config_dir.join(self.content.dir.as_deref().unwrap_or("content")),
            cache_enabled: self.content.cache_enabled.unwrap_or(true),
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/site"));

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.content_resolved.content_dir,
            PathBuf::from("/site/content")
        );
        assert_eq!(
            config.content_resolved.cache_dir(),
            PathBuf::from("/site/content/.cache")
        );
        assert_eq!(
            config.content_resolved.output_dir(),
            PathBuf::from("/site/content/_site")
        );
        assert!(config.content_resolved.cache_enabled);
        assert!(config.watch.enabled);
        assert_eq!(config.watch.ignore, vec![".cache", ".idea"]);
    }

    #[test]
    fn test_port_from_env() {
        assert_eq!(port_from_env(None), 8080);
        assert_eq!(port_from_env(Some("9090")), 9090);
        assert_eq!(port_from_env(Some(" 9091 ")), 9091);
        assert_eq!(port_from_env(Some("http")), 8080);
        assert_eq!(port_from_env(Some("0")), 8080);
    }

    #[test]
    fn test_parse_server_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_parse_watch_config() {
        let toml = r#"
[watch]
enabled = false
ignore = [".cache", ".git", "_site"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.ignore, vec![".cache", ".git", "_site"]);
    }

    #[test]
    fn test_resolve_paths() {
        let toml = r#"
[content]
dir = "site"
cache_enabled = false
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.content_resolved.content_dir,
            PathBuf::from("/project/site")
        );
        assert!(!config.content_resolved.cache_enabled);
    }

    #[test]
    fn test_load_from_file_resolves_relative_to_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[content]\ndir = \"pages\"\n[server]\nport = 8181\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.content_resolved.content_dir, tmp.path().join("pages"));
        assert_eq!(config.server.port, 8181);
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/landing.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_apply_cli_settings_host_and_port() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.apply_cli_settings(&CliSettings {
            host: Some("0.0.0.0".to_owned()),
            port: Some(9000),
            ..Default::default()
        });

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_apply_cli_settings_content_dir() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.apply_cli_settings(&CliSettings {
            content_dir: Some(PathBuf::from("/elsewhere")),
            ..Default::default()
        });

        assert_eq!(
            config.content_resolved.content_dir,
            PathBuf::from("/elsewhere")
        );
        assert_eq!(
            config.content_resolved.cache_dir(),
            PathBuf::from("/elsewhere/.cache")
        );
    }

    #[test]
    fn test_apply_cli_settings_flags() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.apply_cli_settings(&CliSettings {
            cache_enabled: Some(false),
            watch_enabled: Some(false),
            ..Default::default()
        });

        assert!(!config.content_resolved.cache_enabled);
        assert!(!config.watch.enabled);
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default_with_base(Path::new("/site"));
        let port = config.server.port;
        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, port);
        assert!(config.content_resolved.cache_enabled);
        assert!(config.watch.enabled);
    }

    #[test]
    fn test_expand_env_vars_content_dir() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("LANDING_CFG_TEST_DIR", "/data/landing");
        }
        let toml = r#"
[content]
dir = "${LANDING_CFG_TEST_DIR}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.content_resolved.content_dir,
            PathBuf::from("/data/landing")
        );
        unsafe {
            std::env::remove_var("LANDING_CFG_TEST_DIR");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_host() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("LANDING_CFG_TEST_MISSING_HOST");
        }
        let toml = r#"
[server]
host = "${LANDING_CFG_TEST_MISSING_HOST}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { ref field, .. } if field == "server.host"));
    }

    #[test]
    fn test_validate_default_config_passes() {
        Config::default_with_base(Path::new("/site")).validate().unwrap();
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.server.port = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.server.host = String::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_validate_empty_ignore_entry() {
        let mut config = Config::default_with_base(Path::new("/site"));
        config.watch.ignore.push(String::new());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("watch.ignore"));
    }
}
