use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::settings::{ClientSettings, SettingsError};

const CONFIG_ENV: &str = "HOSTPOOL_CONFIG_DIR";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory")]
    MissingDirectory,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("{0}")]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Factory-wide defaults, stored as `config.toml`.
///
/// Connection-level options shape the transport built for each destination.
/// `timeout_secs` and `headers` seed the [`ClientSettings`] of every new handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_idle_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_max_idle_per_host: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl FactoryConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn pool_idle_timeout(&self) -> Option<Duration> {
        self.pool_idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn default_settings(&self) -> Result<ClientSettings, SettingsError> {
        let mut settings = ClientSettings::new();
        settings.set_timeout(self.timeout());
        for (name, value) in &self.headers {
            settings.set_header(name, value)?;
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    base_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let dir = determine_base_dir()?;
        Ok(Self { base_dir: dir })
    }

    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn save(&self, config: &FactoryConfig) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.base_dir)?;
        let contents = toml::to_string(config)?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load(&self) -> Result<FactoryConfig, ConfigError> {
        let contents = fs::read_to_string(self.config_file())?;
        let config: FactoryConfig = toml::from_str(&contents)?;
        config.default_settings()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(&self) -> Result<FactoryConfig, ConfigError> {
        match self.load() {
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.config_file().display(),
                    "no config file, using defaults"
                );
                Ok(FactoryConfig::default())
            }
            other => other,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn determine_base_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    let dirs =
        ProjectDirs::from("dev", "hostpool", "hostpool").ok_or(ConfigError::MissingDirectory)?;
    Ok(dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saves_and_loads_config() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(dir.path());
        let config = FactoryConfig {
            timeout_secs: Some(10),
            user_agent: Some("svc/2.1".to_string()),
            headers: BTreeMap::from([("x-tenant".to_string(), "acme".to_string())]),
            ..FactoryConfig::default()
        };

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(loaded, config);
        assert!(manager.config_file().exists());
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(dir.path());
        fs::write(
            manager.config_file(),
            "connect_timeout_secs = 2\n\n[headers]\naccept = \"application/json\"\n",
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.timeout(), None);

        let settings = config.default_settings().unwrap();
        assert_eq!(settings.header("accept"), Some("application/json"));
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn load_missing_config_returns_error() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(dir.path());

        let err = manager.load().unwrap_err();

        match err {
            ConfigError::Io(io_err) => assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(manager.load_or_default().unwrap(), FactoryConfig::default());
    }

    #[test]
    fn rejects_invalid_header_in_config() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::with_base_dir(dir.path());
        fs::write(manager.config_file(), "[headers]\n\"bad name\" = \"x\"\n").unwrap();

        let err = manager.load().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Settings(SettingsError::InvalidHeaderName { .. })
        ));
    }
}
