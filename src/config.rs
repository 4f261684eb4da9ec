use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "partyq";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub ui: UiConfig,
}

/// Queue server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the party queue server (without the `/api` suffix)
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Base URL with any trailing slashes removed.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Queue refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between automatic queue refreshes
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Vote marker storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Vote marker database (empty = default data dir)
    pub vote_db_path: Option<String>,
}

impl StorageConfig {
    /// Resolve the vote marker database path, creating its parent directory.
    pub fn vote_db_path(&self) -> Result<PathBuf> {
        let path = if let Some(ref custom) = self.vote_db_path {
            PathBuf::from(custom)
        } else {
            dirs::data_dir()
                .context("Failed to get data directory")?
                .join(APP_DIR_NAME)
                .join("votes.redb")
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        Ok(path)
    }
}

/// Notice display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Seconds a notice stays visible
    pub notice_ttl_secs: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { notice_ttl_secs: 5 }
    }
}

impl UiConfig {
    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location, or create it if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.backend.base_url, "http://localhost:3001");
        assert_eq!(config.backend.request_timeout_secs, 10);
        assert_eq!(config.sync.interval_secs, 5);
        assert_eq!(config.sync.interval(), Duration::from_secs(5));
        assert!(config.storage.vote_db_path.is_none());
        assert_eq!(config.ui.notice_ttl_secs, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial_toml = r#"
[backend]
base_url = "https://party.example.com/"
"#;

        let config: Config = toml::from_str(partial_toml).unwrap();

        assert_eq!(config.backend.base_url, "https://party.example.com/");
        assert_eq!(config.backend.normalized_base_url(), "https://party.example.com");
        assert_eq!(config.backend.request_timeout_secs, 10);
        assert_eq!(config.sync.interval_secs, 5);
    }

    #[test]
    fn test_full_config_parsing() {
        let full_toml = r#"
[backend]
base_url = "http://10.0.0.2:8080"
request_timeout_secs = 3

[sync]
interval_secs = 2

[storage]
vote_db_path = "/tmp/votes.redb"

[ui]
notice_ttl_secs = 9
"#;

        let config: Config = toml::from_str(full_toml).unwrap();

        assert_eq!(config.backend.base_url, "http://10.0.0.2:8080");
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.sync.interval(), Duration::from_secs(2));
        assert_eq!(config.storage.vote_db_path, Some("/tmp/votes.redb".to_string()));
        assert_eq!(config.ui.notice_ttl(), Duration::from_secs(9));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config: Config = toml::from_str("[sync]\ninterval_secs = 0\n").unwrap();
        assert_eq!(config.sync.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_example_config_is_valid() {
        let example = Config::example_config();
        let parsed: Result<Config, _> = toml::from_str(&example);
        assert!(parsed.is_ok(), "Example config should be valid TOML");
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = "this is not valid [[ toml";
        let result: Result<Config, _> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_with_unknown_fields_is_ignored() {
        let toml_with_extra = r#"
[backend]
base_url = "http://localhost:3001"
unknown_field = "should be ignored"

[unknown_section]
foo = "bar"
"#;

        let result: Result<Config, _> = toml::from_str(toml_with_extra);
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.sync.interval_secs, 5);

        let mut changed = config.clone();
        changed.backend.base_url = "http://party.local".to_string();
        changed.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.backend.base_url, "http://party.local");
    }
}
