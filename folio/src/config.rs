//! Configuration file handling.
//!
//! The configuration is a JSON document at `~/.folio/config.json`. Every
//! field has a default, so a missing or partial file is valid.

use crate::error::ConfigResult;
use crate::locale::Locale;
use crate::util;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable consulted when no Telegram token is configured.
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// Telegram channel settings.
    pub telegram: TelegramConfig,
    /// Session lifecycle settings.
    pub session: SessionSettings,
    /// Image fetch settings.
    pub fetch: FetchSettings,
    /// Document assembly settings.
    pub assembly: AssemblySettings,
    /// Artifact staging settings.
    pub staging: StagingSettings,
    /// Locale used before the user picks one.
    pub default_locale: Locale,
}

/// Telegram channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Whether the channel is started by `folio run`.
    pub enabled: bool,
    /// Bot token; falls back to `TELEGRAM_BOT_TOKEN`.
    pub token: Option<String>,
    /// Allowed user ids. Empty allows everyone.
    pub allow_from: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            allow_from: Vec::new(),
        }
    }
}

impl TelegramConfig {
    /// Configured token, or the one from the environment.
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(TOKEN_ENV).ok())
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions without activity for this long are evicted.
    pub idle_timeout_secs: u64,
    /// How often the sweeper looks for idle sessions.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Image fetch settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-image timeout.
    pub timeout_secs: u64,
    /// Largest accepted image.
    pub max_image_bytes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

impl FetchSettings {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Document assembly settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    /// Upper bound for one assembly run.
    pub timeout_secs: u64,
    /// Largest batch accepted per session.
    pub max_images: usize,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_images: 100,
        }
    }
}

impl AssemblySettings {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Artifact staging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingSettings {
    /// Staging directory; defaults to `~/.folio/staging`.
    pub dir: Option<PathBuf>,
}

impl StagingSettings {
    /// Effective staging directory.
    #[must_use]
    pub fn resolve_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(util::staging_dir)
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// The configuration cannot be used.
    Error,
    /// The configuration works but is probably not what was intended.
    Warning,
}

/// A problem found by [`FolioConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Severity.
    pub level: IssueLevel,
    /// Human-readable description.
    pub message: String,
}

impl ConfigIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            message: message.into(),
        }
    }
}

impl FolioConfig {
    /// Check the configuration for unusable or suspicious values.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.session.idle_timeout_secs == 0 {
            issues.push(ConfigIssue::error("session.idle_timeout_secs must be > 0"));
        }
        if self.session.sweep_interval_secs == 0 {
            issues.push(ConfigIssue::error("session.sweep_interval_secs must be > 0"));
        }
        if self.fetch.timeout_secs == 0 {
            issues.push(ConfigIssue::error("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.max_image_bytes == 0 {
            issues.push(ConfigIssue::error("fetch.max_image_bytes must be > 0"));
        }
        if self.assembly.timeout_secs == 0 {
            issues.push(ConfigIssue::error("assembly.timeout_secs must be > 0"));
        }
        if self.assembly.max_images == 0 {
            issues.push(ConfigIssue::error("assembly.max_images must be > 0"));
        }
        if self.telegram.enabled && self.telegram.resolve_token().is_none() {
            issues.push(ConfigIssue::warning(format!(
                "telegram is enabled but no token is configured (set telegram.token or {TOKEN_ENV})"
            )));
        }
        for id in &self.telegram.allow_from {
            if id.parse::<i64>().is_err() {
                issues.push(ConfigIssue::warning(format!(
                    "telegram.allow_from entry '{id}' is not a numeric user id"
                )));
            }
        }

        issues
    }

    /// Whether [`validate`](Self::validate) found no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|issue| issue.level != IssueLevel::Error)
    }
}

/// Default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    util::config_path()
}

/// Load the configuration from the default path.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_config() -> ConfigResult<FolioConfig> {
    load_config_from(&config_path()).await
}

/// Load the configuration from `path`; a missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_config_from(path: &Path) -> ConfigResult<FolioConfig> {
    if !tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(FolioConfig::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    let config = serde_json::from_str(&content)?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Save the configuration to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_config(config: &FolioConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    info!(path = %path.display(), "config saved");
    Ok(())
}

/// Write a default configuration to the default path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn init_config() -> ConfigResult<PathBuf> {
    let path = config_path();
    save_config(&FolioConfig::default(), &path).await?;
    Ok(path)
}
