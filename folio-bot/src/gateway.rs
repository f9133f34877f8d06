//! Gateway service for running the complete bot.
//!
//! The gateway is the unified entry point that orchestrates:
//! - The conversation engine and its session table
//! - Channel manager (Telegram, CLI)
//! - The idle-session sweeper

use crate::channel::{ChannelManager, ChannelStatus};
use crate::channels::CliChannel;
use crate::channels::cli::CliChannelConfig;
use folio::config::{FolioConfig, load_config_from};
use folio::error::{FolioError, Result};
use folio::flow::Conversation;
use folio::session::SessionView;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[cfg(feature = "telegram")]
use crate::channels::{TelegramChannel, telegram::TelegramChannelConfig};

/// Gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Engine and channel configuration.
    pub folio: FolioConfig,
    /// Whether to attach the terminal as an extra channel.
    pub enable_cli: bool,
    /// Terminal channel settings.
    pub cli: CliChannelConfig,
}

/// Gateway service that runs the complete bot.
pub struct Gateway {
    config: GatewayConfig,
    engine: Arc<Conversation>,
    channel_manager: ChannelManager,
    running: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("engine", &self.engine)
            .field("enable_cli", &self.config.enable_cli)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let engine = Arc::new(Conversation::from_config(&config.folio)?);
        Ok(Self {
            channel_manager: ChannelManager::new(Arc::clone(&engine)),
            engine,
            config,
            running: Arc::new(RwLock::new(false)),
        })
    }

    /// Get a reference to the engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<Conversation> {
        &self.engine
    }

    /// Get a reference to the channel manager.
    #[must_use]
    pub const fn channel_manager(&self) -> &ChannelManager {
        &self.channel_manager
    }

    /// Get the gateway configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register channels based on configuration.
    async fn setup_channels(&self) {
        if self.config.enable_cli {
            let cli = CliChannel::with_config(self.config.cli.clone());
            self.channel_manager.register(cli).await;
            info!("CLI channel enabled");
        }

        #[cfg(feature = "telegram")]
        if self.config.folio.telegram.enabled {
            if let Some(token) = self.config.folio.telegram.resolve_token() {
                let mut tg_config = TelegramChannelConfig::new(token);

                for user_id_str in &self.config.folio.telegram.allow_from {
                    match user_id_str.parse::<i64>() {
                        Ok(user_id) => tg_config = tg_config.allow_user(user_id),
                        Err(_) => warn!(entry = %user_id_str, "ignoring non-numeric allow_from entry"),
                    }
                }

                let telegram = TelegramChannel::new(tg_config);
                self.channel_manager.register(telegram).await;
                info!("Telegram channel enabled");
            } else {
                error!("Telegram enabled but no token configured");
            }
        }
    }

    /// Run the gateway until Ctrl+C.
    ///
    /// Starts every configured channel and the idle sweeper. On shutdown the
    /// channels are stopped and every remaining session is destroyed, which
    /// removes its staged artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if no channel could be started or the shutdown
    /// signal cannot be installed.
    pub async fn run(&self) -> Result<()> {
        info!("Gateway starting...");
        self.setup_channels().await;

        if self.channel_manager.start_all().await == 0 {
            self.channel_manager.stop_all().await;
            return Err(FolioError::config(
                "no channel could be started (enable telegram with a token, or the CLI)",
            ));
        }
        *self.running.write().await = true;

        let session = &self.config.folio.session;
        let sweeper = self
            .engine
            .spawn_sweeper(session.idle_timeout(), session.sweep_interval());

        info!("Gateway started. Press Ctrl+C to stop.");
        let signal = tokio::signal::ctrl_c().await;

        info!("Gateway stopping...");
        sweeper.stop().await;
        self.channel_manager.stop_all().await;
        let cleared = self.engine.sessions().clear();
        if cleared > 0 {
            info!(cleared, "discarded open sessions");
        }
        *self.running.write().await = false;

        info!("Gateway stopped");
        signal.map_err(FolioError::from)
    }

    /// Check if the gateway is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Get channel and session statuses.
    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            running: *self.running.read().await,
            channels: self.channel_manager.statuses().await,
            sessions: self.engine.sessions().snapshot(),
            staging_dir: self.engine.artifacts().dir().to_path_buf(),
        }
    }
}

/// Gateway status information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayStatus {
    /// Whether the gateway is running.
    pub running: bool,
    /// Channel statuses.
    pub channels: Vec<ChannelStatus>,
    /// Sessions not busy handling an event.
    pub sessions: Vec<SessionView>,
    /// Where artifacts are staged.
    pub staging_dir: PathBuf,
}

/// Builder for creating a Gateway.
#[derive(Debug, Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine configuration.
    #[must_use]
    pub fn folio_config(mut self, config: FolioConfig) -> Self {
        self.config.folio = config;
        self
    }

    /// Override the Telegram token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.folio.telegram.token = Some(token.into());
        self
    }

    /// Enable or disable the Telegram channel.
    #[must_use]
    pub const fn enable_telegram(mut self, enable: bool) -> Self {
        self.config.folio.telegram.enabled = enable;
        self
    }

    /// Override the staging directory.
    #[must_use]
    pub fn staging_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.folio.staging.dir = Some(path.into());
        self
    }

    /// Enable or disable CLI channel.
    #[must_use]
    pub const fn enable_cli(mut self, enable: bool) -> Self {
        self.config.enable_cli = enable;
        self
    }

    /// Set the terminal channel settings.
    #[must_use]
    pub fn cli_config(mut self, config: CliChannelConfig) -> Self {
        self.config.cli = config;
        self
    }

    /// Load configuration from `path`, or the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_config(mut self, path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(folio::config::config_path, Path::to_path_buf);
        self.config.folio = load_config_from(&path).await?;
        Ok(self)
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be built.
    pub fn build(self) -> Result<Gateway> {
        Gateway::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(!config.enable_cli);
        assert!(config.folio.telegram.enabled);
        assert_eq!(config.cli.identity, "cli");
    }

    #[test]
    fn test_builder_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GatewayBuilder::new()
            .token("123:abc")
            .staging_dir(dir.path())
            .enable_cli(true)
            .build()
            .unwrap();

        assert_eq!(gateway.engine().artifacts().dir(), dir.path());
        assert_eq!(
            gateway.config().folio.telegram.token.as_deref(),
            Some("123:abc")
        );
        assert!(gateway.config().enable_cli);
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"assembly": {"max_images": 3}}"#)
            .await
            .unwrap();

        let gateway = GatewayBuilder::new()
            .load_config(Some(&path))
            .await
            .unwrap()
            .staging_dir(dir.path().join("staging"))
            .build()
            .unwrap();

        assert_eq!(gateway.engine().settings().max_images, 3);
    }

    #[tokio::test]
    async fn test_status_before_run() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GatewayBuilder::new()
            .staging_dir(dir.path())
            .build()
            .unwrap();

        let status = gateway.status().await;
        assert!(!status.running);
        assert!(status.channels.is_empty());
        assert!(status.sessions.is_empty());
        assert_eq!(status.staging_dir, dir.path());
        assert!(serde_json::to_string(&status).is_ok());
    }

    #[tokio::test]
    async fn test_run_without_channels_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GatewayBuilder::new()
            .enable_telegram(false)
            .enable_cli(false)
            .staging_dir(dir.path())
            .build()
            .unwrap();

        assert!(gateway.run().await.is_err());
        assert!(!gateway.is_running().await);
    }
}
