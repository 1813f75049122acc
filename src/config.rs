//! Configuration types for Mirra

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::behavior::BehaviorMode;
use crate::fingerprint::RequestFingerprint;
use crate::{MirraError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the proxy listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Path segments of the cache directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Vec<String>,
    /// JSON file with initial overwrites
    #[serde(default)]
    pub overwrites_file: Option<PathBuf>,
    /// Settings that can be changed while running
    #[serde(flatten)]
    pub settings: Settings,
}

/// Runtime settings of the resolution engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Active behavior mode
    #[serde(default)]
    pub proxy_behavior: BehaviorMode,
    /// Upstream host
    #[serde(default = "default_source_host")]
    pub source_host: String,
    /// Upstream port; 443 selects https
    #[serde(default = "default_source_port")]
    pub source_port: u16,
    /// Search string for the overwrite helper
    #[serde(default)]
    pub find: Option<String>,
    /// Do not report error responses
    #[serde(default)]
    pub hide_errors: bool,
    /// Responses logged in full whenever served
    #[serde(default)]
    pub responses_to_log: Vec<RequestFingerprint>,
    /// Maximum request body size in bytes
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

/// Partial settings; `Some` fields replace the current values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    /// New behavior mode
    pub proxy_behavior: Option<BehaviorMode>,
    /// New upstream host
    pub source_host: Option<String>,
    /// New upstream port
    pub source_port: Option<u16>,
    /// New search string; `Some(None)` clears it
    pub find: Option<Option<String>>,
    /// New error reporting flag
    pub hide_errors: Option<bool>,
    /// New list of logged responses
    pub responses_to_log: Option<Vec<RequestFingerprint>>,
}

fn default_listen_port() -> u16 {
    80
}

fn default_cache_dir() -> Vec<String> {
    vec!["responses".to_string()]
}

fn default_source_host() -> String {
    "www.example.com".to_string()
}

fn default_source_port() -> u16 {
    443
}

fn default_max_request_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_behavior: BehaviorMode::default(),
            source_host: default_source_host(),
            source_port: default_source_port(),
            find: None,
            hide_errors: false,
            responses_to_log: Vec::new(),
            max_request_size: default_max_request_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            cache_dir: default_cache_dir(),
            overwrites_file: None,
            settings: Settings::default(),
        }
    }
}

impl Settings {
    /// Settings with the patch's fields applied
    #[must_use]
    pub fn patched(&self, patch: SettingsPatch) -> Self {
        Self {
            proxy_behavior: patch.proxy_behavior.unwrap_or(self.proxy_behavior),
            source_host: patch
                .source_host
                .unwrap_or_else(|| self.source_host.clone()),
            source_port: patch.source_port.unwrap_or(self.source_port),
            find: patch.find.unwrap_or_else(|| self.find.clone()),
            hide_errors: patch.hide_errors.unwrap_or(self.hide_errors),
            responses_to_log: patch
                .responses_to_log
                .unwrap_or_else(|| self.responses_to_log.clone()),
            max_request_size: self.max_request_size,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MirraError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MirraError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.is_empty() || self.cache_dir.iter().any(String::is_empty) {
            return Err(MirraError::ConfigError(
                "cache_dir must be a list of non-empty path segments".to_string(),
            ));
        }

        if self.listen_port == 0 {
            return Err(MirraError::ConfigError(
                "listen_port cannot be 0".to_string(),
            ));
        }

        if self.settings.source_host.is_empty() {
            return Err(MirraError::ConfigError(
                "source_host cannot be empty".to_string(),
            ));
        }

        if self.settings.source_port == 0 {
            return Err(MirraError::ConfigError(
                "source_port cannot be 0".to_string(),
            ));
        }

        if self.settings.max_request_size == 0 {
            return Err(MirraError::ConfigError(
                "max_request_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            listen_port = 8080
            cache_dir = ["fixtures", "api"]
            proxy_behavior = "RELOAD_RESPONSES_WITH_ERRORS"
            source_host = "api.example.com"
            source_port = 443
            responses_to_log = ["responseFor1395794231"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.cache_dir, vec!["fixtures", "api"]);
        assert_eq!(
            config.settings.proxy_behavior,
            BehaviorMode::ReloadResponsesWithErrors
        );
        assert_eq!(config.settings.source_host, "api.example.com");
        assert_eq!(config.settings.responses_to_log.len(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.listen_port, 80);
        assert_eq!(config.cache_dir, vec!["responses"]);
        assert_eq!(
            config.settings.proxy_behavior,
            BehaviorMode::SaveResponsesForNewQueries
        );
        assert_eq!(config.settings.source_host, "www.example.com");
        assert_eq!(config.settings.source_port, 443);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            proxy_behavior = "NO_REQUEST_FORWARDING"
            source_host = "api.example.com"
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.settings.proxy_behavior,
            BehaviorMode::NoRequestForwarding
        );
    }

    #[test]
    fn test_invalid_config_unknown_mode() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"proxy_behavior = \"SOMETIMES\"").unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_invalid_config_empty_cache_dir() {
        let config: Config = toml::from_str("cache_dir = []").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_patch() {
        let settings = Settings {
            find: Some("needle".to_string()),
            ..Settings::default()
        };

        let patched = settings.patched(SettingsPatch {
            proxy_behavior: Some(BehaviorMode::ForceUpdateAll),
            find: Some(None),
            ..SettingsPatch::default()
        });

        assert_eq!(patched.proxy_behavior, BehaviorMode::ForceUpdateAll);
        assert_eq!(patched.find, None);
        assert_eq!(patched.source_host, settings.source_host);
    }
}
