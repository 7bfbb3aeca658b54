//! Application settings and configuration types.
//!
//! Settings are persisted to `<config dir>/triage/settings.json` (XDG or the
//! platform equivalent) and loaded when the CLI starts. Every field has a
//! default, so a partial or missing file is valid.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "triage";
const APPLICATION: &str = "triage";

/// Environment variable that overrides the database path.
pub const DATABASE_ENV: &str = "TRIAGE_DATABASE";

/// Errors raised while locating, reading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine the platform config and data directories")]
    MissingDirectories,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite connection settings.
    pub database: DatabaseSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
    /// Defaults for onboarding and action processing.
    pub triage: TriageSettings,
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from `path`, falling back to defaults if the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::read(path)?.unwrap_or_default())
    }

    /// Reads settings from `path`, or `None` if the file is absent.
    pub fn read(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Writes settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_database_override(std::env::var(DATABASE_ENV).ok());
    }

    /// Replaces the database path when `value` is set and not blank.
    pub fn apply_database_override(&mut self, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.database.path = Some(PathBuf::from(value));
        }
    }

    /// Resolves the database file, defaulting to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("triage.db")),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or(ConfigError::MissingDirectories)
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file. `None` uses the platform data directory.
    pub path: Option<PathBuf>,
    /// How long to wait on a locked database before failing, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Use write-ahead logging for file databases.
    pub wal: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5_000,
            wal: true,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// A category created for every newly connected mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CategorySeed {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// Defaults for onboarding and action processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageSettings {
    /// Categories ensured on every mailbox connection.
    pub default_categories: Vec<CategorySeed>,
    /// Maximum number of pending actions run per batch.
    pub pending_action_batch: u32,
    /// Session lifetime in days.
    pub session_ttl_days: i64,
    /// Verification token lifetime in minutes.
    pub verification_ttl_minutes: i64,
}

impl TriageSettings {
    pub fn session_ttl(&self) -> Duration {
        Duration::days(self.session_ttl_days)
    }

    pub fn verification_ttl(&self) -> Duration {
        Duration::minutes(self.verification_ttl_minutes)
    }
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            default_categories: vec![
                CategorySeed::new("Newsletters", "Mailing lists and digests"),
                CategorySeed::new("Receipts", "Orders, invoices and payment confirmations"),
                CategorySeed::new("Social", "Notifications from social networks"),
            ],
            pending_action_batch: 50,
            session_ttl_days: 30,
            verification_ttl_minutes: 60,
        }
    }
}
