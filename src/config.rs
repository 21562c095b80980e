//! forgehub configuration (`forgehub.toml`).
//!
//! Defines the typed configuration for the store connection, repository
//! defaults, account rules and retry policy. Every section and field is
//! optional; a missing file means all defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forgehub_db::{StoreOptions, Synchronous};
use serde::Deserialize;

use crate::model::types::BranchName;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level forgehub configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    /// Database location and connection settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Defaults applied when creating repositories.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// User account rules.
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// How callers re-issue operations that failed as retryable.
    #[serde(default)]
    pub retry: RetryConfig,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Database location and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path of the SQLite database (default: `forgehub.db`).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Milliseconds a writer waits for the write lock (default: 5000).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Durability level (default: `full`).
    #[serde(default)]
    pub synchronous: SynchronousSetting,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            synchronous: SynchronousSetting::default(),
        }
    }
}

impl StoreConfig {
    /// Connection options for [`forgehub_db::Store::open`].
    #[must_use]
    pub const fn options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            synchronous: self.synchronous.level(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("forgehub.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

/// `synchronous` values accepted in the config file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynchronousSetting {
    /// See [`Synchronous::Off`].
    Off,
    /// See [`Synchronous::Normal`].
    Normal,
    /// See [`Synchronous::Full`].
    #[default]
    Full,
}

impl SynchronousSetting {
    /// The storage-layer level.
    #[must_use]
    pub const fn level(self) -> Synchronous {
        match self {
            Self::Off => Synchronous::Off,
            Self::Normal => Synchronous::Normal,
            Self::Full => Synchronous::Full,
        }
    }
}

// ---------------------------------------------------------------------------
// RepositoryConfig
// ---------------------------------------------------------------------------

/// Defaults applied when creating repositories.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Name of the root branch created with every repository (default: `main`).
    #[serde(default = "default_branch")]
    pub default_branch: BranchName,

    /// Whether the initial commit contains a generated `README.md`.
    #[serde(default = "default_initial_readme")]
    pub initial_readme: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            initial_readme: default_initial_readme(),
        }
    }
}

fn default_branch() -> BranchName {
    BranchName::new("main").unwrap_or_else(|_| unreachable!("'main' is a valid branch name"))
}

const fn default_initial_readme() -> bool {
    true
}

// ---------------------------------------------------------------------------
// AccountsConfig
// ---------------------------------------------------------------------------

/// User account rules.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountsConfig {
    /// Reject a new user whose email (case-insensitive) is already registered.
    #[serde(default = "default_unique_email")]
    pub unique_email: bool,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            unique_email: default_unique_email(),
        }
    }
}

const fn default_unique_email() -> bool {
    true
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Retry policy for operations that fail with a retryable error.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3, minimum 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; grows linearly (default: 50).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    50
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or parsing `forgehub.toml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in '{}': {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ForgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields all defaults. An unreadable file, invalid TOML
    /// or an unknown field is an error carrying the path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].matches('\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError {
                path: None,
                message: "retry.max_attempts must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = ForgeConfig::default();
        assert_eq!(cfg.store.path, PathBuf::from("forgehub.db"));
        assert_eq!(cfg.store.busy_timeout_ms, 5000);
        assert_eq!(cfg.store.synchronous, SynchronousSetting::Full);
        assert_eq!(cfg.repository.default_branch.as_str(), "main");
        assert!(cfg.repository.initial_readme);
        assert!(cfg.accounts.unique_email);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.backoff_ms, 50);
    }

    #[test]
    fn parse_empty_string() {
        assert_eq!(ForgeConfig::parse("").unwrap(), ForgeConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[store]
path = "/var/lib/forgehub/data.db"
busy_timeout_ms = 250
synchronous = "normal"

[repository]
default_branch = "trunk"
initial_readme = false

[accounts]
unique_email = false

[retry]
max_attempts = 5
backoff_ms = 10
"#;
        let cfg = ForgeConfig::parse(toml).unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("/var/lib/forgehub/data.db"));
        let options = cfg.store.options();
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
        assert_eq!(options.synchronous, Synchronous::Normal);
        assert_eq!(cfg.repository.default_branch.as_str(), "trunk");
        assert!(!cfg.repository.initial_readme);
        assert!(!cfg.accounts.unique_email);
        assert_eq!(cfg.retry.max_attempts, 5);
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let cfg = ForgeConfig::parse("[retry]\nbackoff_ms = 5\n").unwrap();
        assert_eq!(cfg.retry.backoff_ms, 5);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        assert!(ForgeConfig::parse("[store]\nflavour = \"wal\"\n").is_err());
        assert!(ForgeConfig::parse("[telemetry]\n").is_err());
    }

    #[test]
    fn parse_rejects_invalid_default_branch() {
        let err = ForgeConfig::parse("[repository]\ndefault_branch = \"a..b\"\n").unwrap_err();
        assert!(err.message.contains("line 2"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_zero_attempts() {
        let err = ForgeConfig::parse("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(err.message.contains("at least 1"));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = ForgeConfig::load(Path::new("/nonexistent/forgehub.toml")).unwrap();
        assert_eq!(cfg, ForgeConfig::default());
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forgehub.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = ForgeConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().contains("forgehub.toml"));
    }
}
