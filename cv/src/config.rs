//! Canvass configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::PromptConfig;
use crate::transport::DEFAULT_CHANNEL_CAPACITY;

/// Main Canvass configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Broadcast transport settings
    pub transport: TransportConfig,

    /// Requestor-side defaults
    pub coordinator: CoordinatorConfig,

    /// Prompt defaults
    pub dialog: DialogConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.canvass.yml`, then the user config directory,
    /// then built-in defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".canvass.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("canvass").join("canvass.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Broadcast transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Frames buffered per link before a slow peer starts losing them
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Requestor-side defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Finish queries still open after this many seconds; unset means never
    #[serde(rename = "query-ttl-secs", skip_serializing_if = "Option::is_none")]
    pub query_ttl_secs: Option<u64>,

    /// Buffer size of the peer request channel
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,

    /// Attach a status view when the caller does not say
    #[serde(rename = "default-show-status")]
    pub default_show_status: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            query_ttl_secs: None,
            channel_buffer: 100,
            default_show_status: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn query_ttl(&self) -> Option<Duration> {
        self.query_ttl_secs.map(Duration::from_secs)
    }
}

/// Prompt defaults applied when a query brings no options of its own
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialogConfig {
    #[serde(rename = "only-one-waiting")]
    pub only_one_waiting: bool,

    #[serde(rename = "always-use-answer-object")]
    pub always_use_answer_object: bool,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            only_one_waiting: true,
            always_use_answer_object: false,
        }
    }
}

impl DialogConfig {
    pub fn prompt_config(&self) -> PromptConfig {
        PromptConfig {
            only_one_waiting: self.only_one_waiting,
            always_use_answer_object: self.always_use_answer_object,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.transport.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.coordinator.query_ttl(), None);
        assert_eq!(config.coordinator.channel_buffer, 100);
        assert!(config.dialog.only_one_waiting);
        assert!(!config.dialog.always_use_answer_object);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
transport:
  channel-capacity: 64

coordinator:
  query-ttl-secs: 30
  channel-buffer: 10
  default-show-status: true

dialog:
  only-one-waiting: false
  always-use-answer-object: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.transport.channel_capacity, 64);
        assert_eq!(config.coordinator.query_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(config.coordinator.channel_buffer, 10);
        assert!(config.coordinator.default_show_status);

        let prompt = config.dialog.prompt_config();
        assert!(!prompt.only_one_waiting);
        assert!(prompt.always_use_answer_object);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
coordinator:
  query-ttl-secs: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.coordinator.query_ttl_secs, Some(5));
        assert_eq!(config.coordinator.channel_buffer, 100);
        assert_eq!(config.transport, TransportConfig::default());
        assert_eq!(config.dialog, DialogConfig::default());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "transport:\n  channel-capacity: 8").unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.transport.channel_capacity, 8);
    }

    #[test]
    fn test_load_explicit_path_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("nope.yml"));

        let bad = dir.path().join("bad.yml");
        fs::write(&bad, "transport: [not, a, map]").unwrap();
        assert!(Config::load(Some(&bad)).is_err());
    }
}
