use bw_durable::{ActivityOptions, RetryPolicy, RuntimeConfig, SessionOptions};
use bw_git::Signature;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "branchwise.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub runtime: RuntimeSection,
    pub session: SessionSection,
    pub activity: ActivitySection,
    pub git: GitSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    pub id_prefix: String,
    pub max_history: usize,
    pub session_slots: usize,
    pub mailbox_capacity: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        let runtime = RuntimeConfig::default();
        Self {
            id_prefix: "bw".to_string(),
            max_history: runtime.max_history,
            session_slots: runtime.session_slots,
            mailbox_capacity: runtime.mailbox_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub creation_timeout_secs: u64,
    pub execution_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            creation_timeout_secs: 30,
            execution_timeout_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivitySection {
    pub start_to_close_secs: u64,
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub max_interval_ms: u64,
}

impl Default for ActivitySection {
    fn default() -> Self {
        Self {
            start_to_close_secs: 300,
            max_attempts: 3,
            initial_interval_ms: 1_000,
            backoff_coefficient: 2.0,
            max_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitSection {
    /// Parent directory of every per-session clone.
    pub clone_root: PathBuf,
    pub committer_name: String,
    pub committer_email: String,
}

impl Default for GitSection {
    fn default() -> Self {
        let committer = Signature::default();
        Self {
            clone_root: std::env::temp_dir().join("branchwise"),
            committer_name: committer.name,
            committer_email: committer.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub db_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".branchwise/branchwise.db"),
        }
    }
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads from `BW_CONFIG` (or `branchwise.toml`) and applies the
    /// process environment on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("BW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BW_CLONE_ROOT") {
            self.git.clone_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("BW_DB_PATH") {
            self.store.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("BW_ID_PREFIX") {
            self.runtime.id_prefix = value;
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_history: self.runtime.max_history.max(1),
            mailbox_capacity: self.runtime.mailbox_capacity.max(1),
            session_slots: self.runtime.session_slots.max(1),
            session: SessionOptions {
                creation_timeout: Duration::from_secs(self.session.creation_timeout_secs),
                execution_timeout: Duration::from_secs(self.session.execution_timeout_secs),
            },
            activity: ActivityOptions {
                start_to_close: Duration::from_secs(self.activity.start_to_close_secs),
                retry: RetryPolicy {
                    max_attempts: self.activity.max_attempts.max(1),
                    initial_interval: Duration::from_millis(self.activity.initial_interval_ms),
                    backoff_coefficient: self.activity.backoff_coefficient,
                    max_interval: Duration::from_millis(self.activity.max_interval_ms),
                },
            },
        }
    }

    pub fn committer(&self) -> Signature {
        Signature {
            name: self.git.committer_name.clone(),
            email: self.git.committer_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.runtime.id_prefix, "bw");
        assert_eq!(
            config.runtime_config().session.execution_timeout,
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [runtime]
            id_prefix = "acme"
            max_history = 10

            [activity]
            max_attempts = 5
            initial_interval_ms = 50

            [git]
            clone_root = "/var/lib/bw/clones"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.id_prefix, "acme");
        assert_eq!(config.runtime.session_slots, RuntimeSection::default().session_slots);
        let runtime = config.runtime_config();
        assert_eq!(runtime.max_history, 10);
        assert_eq!(runtime.activity.retry.max_attempts, 5);
        assert_eq!(runtime.activity.retry.initial_interval, Duration::from_millis(50));
        assert_eq!(config.git.clone_root, PathBuf::from("/var/lib/bw/clones"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml("[runtime]\nprefix = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "BW_CLONE_ROOT" => Some("/tmp/clones".to_string()),
            "BW_ID_PREFIX" => Some("staging".to_string()),
            _ => None,
        });
        assert_eq!(config.git.clone_root, PathBuf::from("/tmp/clones"));
        assert_eq!(config.runtime.id_prefix, "staging");
        assert_eq!(config.store.db_path, StoreSection::default().db_path);
    }
}
