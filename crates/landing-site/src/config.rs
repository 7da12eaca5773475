//! Site configuration: `config.yml`, `secrets.yml` and `data/` files.

use std::path::Path;
use std::sync::{Arc, RwLock};

use landing_storage::{Folders, list_files};
use landing_template::{Map, Value};
use tracing::{debug, warn};

use crate::error::SiteError;

#[derive(Debug, Default)]
struct Loaded {
    config: Arc<Map>,
    secrets: Arc<Map>,
    data: Arc<Map>,
}

/// Site configuration reloaded from the content root.
///
/// Values are swapped wholesale on [`SiteConfigService::reload`]; callers
/// holding an `Arc<Map>` keep the version they read.
#[derive(Debug)]
pub struct SiteConfigService {
    folders: Folders,
    loaded: RwLock<Loaded>,
    extra: RwLock<Map>,
}

impl SiteConfigService {
    /// Load the configuration once.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration or data file is unreadable or
    /// not valid YAML.
    pub fn load(folders: Folders) -> Result<Self, SiteError> {
        let service = Self {
            folders,
            loaded: RwLock::new(Loaded::default()),
            extra: RwLock::new(Map::new()),
        };
        service.reload()?;
        Ok(service)
    }

    /// Re-read every file. On error the previous values stay in place.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is unreadable or not valid YAML.
    pub fn reload(&self) -> Result<(), SiteError> {
        let config = match self.folders.config_files().iter().find(|p| p.is_file()) {
            Some(path) => read_map(path)?,
            None => Map::new(),
        };
        let secrets_file = self.folders.secrets_file();
        let secrets = if secrets_file.is_file() {
            read_map(&secrets_file)?
        } else {
            Map::new()
        };

        let mut data = Map::new();
        for path in list_files(&[self.folders.data_dir()], &["yml", "yaml"])? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            data.insert(stem.to_owned(), read_yaml(&path)?);
        }

        debug!(keys = config.len(), data = data.len(), "Site config loaded");
        *self.loaded.write().expect("site config lock poisoned") = Loaded {
            config: Arc::new(config),
            secrets: Arc::new(secrets),
            data: Arc::new(data),
        };
        Ok(())
    }

    /// Contents of `config.yml`.
    #[must_use]
    pub fn config(&self) -> Arc<Map> {
        Arc::clone(&self.loaded.read().expect("site config lock poisoned").config)
    }

    /// `data/` files keyed by file stem.
    #[must_use]
    pub fn data(&self) -> Arc<Map> {
        Arc::clone(&self.loaded.read().expect("site config lock poisoned").data)
    }

    /// One value from `secrets.yml`, as text.
    #[must_use]
    pub fn secret(&self, key: &str) -> Option<String> {
        self.loaded
            .read()
            .expect("site config lock poisoned")
            .secrets
            .get(key)
            .and_then(Value::to_text_opt)
    }

    /// Environment variable `key`, else the config value of the same name.
    #[must_use]
    pub fn config_or_env(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.config().get(key).and_then(Value::to_text_opt))
    }

    /// Bindings added to every render scope, after the config itself.
    #[must_use]
    pub fn extra(&self) -> Map {
        self.extra.read().expect("site config extra lock poisoned").clone()
    }

    pub fn set_extra(&self, key: impl Into<String>, value: Value) {
        self.extra
            .write()
            .expect("site config extra lock poisoned")
            .insert(key.into(), value);
    }
}

fn read_yaml(path: &Path) -> Result<Value, SiteError> {
    let text = std::fs::read_to_string(path).map_err(|e| SiteError::io(e, path))?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|source| SiteError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Value::from(&yaml))
}

fn read_map(path: &Path) -> Result<Map, SiteError> {
    match read_yaml(path)? {
        Value::Map(map) => Ok(Arc::unwrap_or_clone(map)),
        Value::Null => Ok(Map::new()),
        _ => {
            warn!(path = %path.display(), "Ignoring configuration that is not a mapping");
            Ok(Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    static_assertions::assert_impl_all!(SiteConfigService: Send, Sync);

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yml"), "title: My Site\nurl: example.com\n").unwrap();
        fs::write(dir.path().join("secrets.yml"), "youtube_api_key: abc\n").unwrap();
        fs::create_dir_all(dir.path().join("data/nested")).unwrap();
        fs::write(dir.path().join("data/authors.yml"), "- name: Ann\n- name: Bo\n").unwrap();
        fs::write(dir.path().join("data/nested/links.yml"), "home: /\n").unwrap();
        dir
    }

    #[test]
    fn test_load_config_secrets_and_data() {
        let dir = site();
        let service = SiteConfigService::load(Folders::new(dir.path())).unwrap();

        assert_eq!(service.config().get("title").unwrap().to_string(), "My Site");
        assert_eq!(service.secret("youtube_api_key").as_deref(), Some("abc"));
        assert_eq!(service.secret("missing"), None);

        let data = service.data();
        assert_eq!(data.get("authors").unwrap().len(), 2);
        assert_eq!(data.get("links").unwrap().attr("home").to_string(), "/");
    }

    #[test]
    fn test_underscore_config_is_a_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_config.yml"), "title: Fallback\n").unwrap();

        let service = SiteConfigService::load(Folders::new(dir.path())).unwrap();

        assert_eq!(service.config().get("title").unwrap().to_string(), "Fallback");
    }

    #[test]
    fn test_missing_files_give_empty_config() {
        let dir = TempDir::new().unwrap();
        let service = SiteConfigService::load(Folders::new(dir.path())).unwrap();

        assert!(service.config().is_empty());
        assert!(service.data().is_empty());
    }

    #[test]
    fn test_reload_picks_up_changes_and_keeps_old_on_error() {
        let dir = site();
        let service = SiteConfigService::load(Folders::new(dir.path())).unwrap();

        fs::write(dir.path().join("config.yml"), "title: Renamed\n").unwrap();
        service.reload().unwrap();
        assert_eq!(service.config().get("title").unwrap().to_string(), "Renamed");

        fs::write(dir.path().join("config.yml"), "title: [\n").unwrap();
        assert!(service.reload().is_err());
        assert_eq!(service.config().get("title").unwrap().to_string(), "Renamed");
    }

    #[test]
    fn test_config_or_env_prefers_environment() {
        let dir = site();
        let service = SiteConfigService::load(Folders::new(dir.path())).unwrap();

        assert_eq!(service.config_or_env("url").as_deref(), Some("example.com"));
        assert_eq!(service.config_or_env("LANDING_TEST_SURELY_UNSET_KEY"), None);
    }

    #[test]
    fn test_extra_bindings() {
        let dir = site();
        let service = SiteConfigService::load(Folders::new(dir.path())).unwrap();

        service.set_extra("analytics", Value::from("UA-1"));

        assert_eq!(service.extra().get("analytics").unwrap().to_string(), "UA-1");
    }
}
