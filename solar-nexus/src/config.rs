//! Application configuration.
//!
//! Every field has a default so the site runs without a config file. The
//! file lives at `<config dir>/solar-site/config.toml`.

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigParseSnafu, ConfigReadSnafu, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix for every `App::api` endpoint.
    pub api_base_url: String,
    /// Verbose logging.
    pub debug: bool,
    /// Path routed at startup.
    pub initial_path: String,
    /// Routing passes slower than this are logged as warnings.
    pub slow_route_ms: u64,
    /// Route uncaught panics through the error reporter.
    pub capture_panics: bool,
    pub storage: StorageConfig,
    /// Component name to enabled flag. Unlisted components are enabled.
    pub features: BTreeMap<String, bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            debug: false,
            initial_path: "/".into(),
            slow_route_ms: 500,
            capture_panics: true,
            storage: StorageConfig::default(),
            features: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(true)
    }

    /// Names explicitly switched off.
    pub fn disabled_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable store file; defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solar-site")
        .join("config.toml")
}

/// Load from the default location.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

/// Load from `path`; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path).context(ConfigReadSnafu { path })?;
    toml::from_str(&contents).context(ConfigParseSnafu { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
api_base_url = "https://solar.example/api"

[features]
testimonials = false
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.api_base_url, "https://solar.example/api");
        assert_eq!(config.initial_path, "/");
        assert!(!config.feature_enabled("testimonials"));
        assert!(config.feature_enabled("hero"));
        assert_eq!(config.disabled_features().collect::<Vec<_>>(), vec!["testimonials"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "debug = \"very\"").unwrap();
        assert!(matches!(load_config_from(&path), Err(Error::ConfigParse { .. })));
    }
}
