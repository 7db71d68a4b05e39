//! Configuration loading.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config.json` in the platform config dir (or an explicit path)
//! 3. `BOTWIRE_*` environment variables
//! 4. Command line flags (applied by the binary)
//!
//! The access token is never written to disk; it comes from the
//! environment or the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_COMMAND_PREFIX, DEFAULT_ENDPOINT, DEFAULT_SEND_INTERVAL,
    RECONNECT_DELAY,
};

/// Configuration of one engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// WebSocket URL of the agent.
    pub endpoint: String,
    /// Access token - NOT serialized to disk.
    #[serde(skip)]
    pub access_token: Option<String>,
    /// Characters that mark a message as a command.
    pub command_prefixes: Vec<char>,
    /// Minimum spacing between outbound frames, in milliseconds.
    pub send_interval_ms: u64,
    /// Seconds a call waits for its response; 0 waits forever.
    pub call_timeout_secs: u64,
    /// Seconds between a lost connection and the next attempt.
    pub reconnect_delay_secs: u64,
    /// Default log filter for the binary.
    pub log_level: String,
    /// Accounts allowed to run admin-only commands.
    pub admins: Vec<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            command_prefixes: vec![DEFAULT_COMMAND_PREFIX],
            send_interval_ms: duration_millis(DEFAULT_SEND_INTERVAL),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            reconnect_delay_secs: RECONNECT_DELAY.as_secs(),
            log_level: "info".to_string(),
            admins: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("botwire")
            .join("config.json"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file at an explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from_file(&path)?
                } else {
                    log::debug!("[Config] No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `BOTWIRE_*` overrides read through `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("BOTWIRE_ENDPOINT") {
            self.endpoint = endpoint;
        }

        if let Some(token) = lookup("BOTWIRE_TOKEN") {
            self.access_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Some(prefixes) = lookup("BOTWIRE_COMMAND_PREFIX") {
            let prefixes: Vec<char> = prefixes.chars().filter(|c| !c.is_whitespace()).collect();
            if !prefixes.is_empty() {
                self.command_prefixes = prefixes;
            }
        }

        if let Some(raw) = lookup("BOTWIRE_SEND_INTERVAL_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => self.send_interval_ms = ms,
                Err(e) => log::warn!("[Config] Ignoring BOTWIRE_SEND_INTERVAL_MS={}: {}", raw, e),
            }
        }

        if let Some(raw) = lookup("BOTWIRE_CALL_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => self.call_timeout_secs = secs,
                Err(e) => log::warn!("[Config] Ignoring BOTWIRE_CALL_TIMEOUT_SECS={}: {}", raw, e),
            }
        }

        if let Some(level) = lookup("BOTWIRE_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Minimum spacing between outbound frames.
    #[must_use]
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    /// Call timeout, `None` when calls wait forever.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }

    /// Delay before reconnecting.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Check if an access token is configured.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.endpoint, "ws://127.0.0.1:3001");
        assert_eq!(config.command_prefixes, vec!['#']);
        assert_eq!(config.send_interval(), Duration::from_millis(100));
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert!(!config.has_token());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "endpoint": "ws://agent:6700", "command_prefixes": ["!", "/"], "admins": [42] }}"#
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "ws://agent:6700");
        assert_eq!(config.command_prefixes, vec!['!', '/']);
        assert_eq!(config.admins, vec![42]);
        // Unspecified fields keep their defaults.
        assert_eq!(config.send_interval_ms, 100);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load(Some(&dir.path().join("absent.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_token_is_never_serialized() {
        let config = EngineConfig {
            access_token: Some("secret".to_string()),
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));

        let parsed: EngineConfig =
            serde_json::from_str(r#"{ "access_token": "from-file" }"#).unwrap();
        assert_eq!(parsed.access_token, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config.apply_env_overrides(lookup(&[
            ("BOTWIRE_ENDPOINT", "ws://elsewhere:1"),
            ("BOTWIRE_TOKEN", "t0k"),
            ("BOTWIRE_COMMAND_PREFIX", "!/"),
            ("BOTWIRE_SEND_INTERVAL_MS", "250"),
            ("BOTWIRE_CALL_TIMEOUT_SECS", "0"),
            ("BOTWIRE_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.endpoint, "ws://elsewhere:1");
        assert_eq!(config.access_token.as_deref(), Some("t0k"));
        assert_eq!(config.command_prefixes, vec!['!', '/']);
        assert_eq!(config.send_interval(), Duration::from_millis(250));
        assert_eq!(config.call_timeout(), None);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_bad_numeric_override_is_ignored() {
        let mut config = EngineConfig::default();
        config.apply_env_overrides(lookup(&[("BOTWIRE_SEND_INTERVAL_MS", "fast")]));
        assert_eq!(config.send_interval_ms, 100);
    }
}
