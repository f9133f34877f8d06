//! Command-line interface channel implementation.
//!
//! The CLI channel drives one local conversation from standard input. Lines
//! are classified like chat messages, except that `@<path>` or `@<url>`
//! submits an image. Delivered documents are written to an output directory.

use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus};
use async_trait::async_trait;
use folio::error::{ChannelError, ChannelResult};
use folio::events::{Identity, InboundEvent, OutboundReply, Reply};
use folio::flow::Conversation;
use folio::store::Locator;
use folio::transport::Transport;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Prefix marking a line as an image reference.
pub const IMAGE_PREFIX: char = '@';

/// CLI channel configuration.
#[derive(Debug, Clone)]
pub struct CliChannelConfig {
    /// Prompt string to display before user input.
    pub prompt: String,
    /// Identity used for the local conversation.
    pub identity: String,
    /// Directory receiving delivered documents.
    pub out_dir: PathBuf,
}

impl Default for CliChannelConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            identity: "cli".to_string(),
            out_dir: PathBuf::from("."),
        }
    }
}

impl CliChannelConfig {
    /// Create a new CLI channel config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prompt string.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the identity.
    #[must_use]
    pub fn identity(mut self, id: impl Into<String>) -> Self {
        self.identity = id.into();
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }
}

/// Turn one input line into an event, or `None` for a blank line.
#[must_use]
pub fn parse_line(identity: &Identity, line: &str) -> Option<InboundEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(target) = trimmed.strip_prefix(IMAGE_PREFIX) {
        let target = target.trim();
        let locator = if target.starts_with("http://") || target.starts_with("https://") {
            Locator::Url(target.to_string())
        } else {
            Locator::Path(PathBuf::from(target))
        };
        return Some(InboundEvent::image(identity.clone(), locator));
    }

    Some(InboundEvent::from_text(identity.clone(), line))
}

fn is_exit(line: &str) -> bool {
    matches!(line.trim(), "exit" | "quit" | "/quit")
}

/// Transport printing replies to stdout and saving documents to disk.
#[derive(Debug, Clone)]
pub struct TerminalTransport {
    out_dir: PathBuf,
    base: Arc<ChannelBase>,
}

impl TerminalTransport {
    /// Create a transport writing documents into `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>, base: Arc<ChannelBase>) -> Self {
        Self {
            out_dir: out_dir.into(),
            base,
        }
    }

    /// Text shown for a textual reply.
    #[must_use]
    pub fn render(reply: &Reply) -> Option<String> {
        match reply {
            Reply::Text { text, .. } => Some(text.clone()),
            Reply::Keyboard { text, choices, .. } => {
                Some(format!("{text}\n[ {} ]", choices.join(" | ")))
            }
            Reply::Document { .. } => None,
        }
    }

    #[allow(clippy::print_stdout)] // CLI channel intentionally prints to stdout
    fn print(text: &str) {
        println!("\n{text}\n");
    }
}

#[async_trait]
impl Transport for TerminalTransport {
    async fn send(&self, reply: &OutboundReply) -> ChannelResult<()> {
        if let Reply::Document { file_name, bytes } = &reply.reply {
            let path = self.out_dir.join(file_name);
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                let error = ChannelError::send(format!("failed to save {}: {e}", path.display()));
                self.base.note_failure(&error).await;
                return Err(error);
            }
            info!(path = %path.display(), size = bytes.len(), "document saved");
            self.base.note_document().await;
            Self::print(&format!("[saved {}]", path.display()));
        } else if let Some(text) = Self::render(&reply.reply) {
            Self::print(&text);
        }

        Ok(())
    }
}

/// Command-line interface channel.
///
/// Reads stdin in a background task once started.
///
/// # Example
///
/// ```rust,ignore
/// use folio_bot::channels::CliChannel;
///
/// let cli = CliChannel::new();
/// cli.start(engine).await?;
/// ```
#[derive(Debug)]
pub struct CliChannel {
    base: Arc<ChannelBase>,
    config: CliChannelConfig,
    reader: RwLock<Option<JoinHandle<()>>>,
}

impl CliChannel {
    /// Create a new CLI channel with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CliChannelConfig::default())
    }

    /// Create a new CLI channel with the given configuration.
    #[must_use]
    pub fn with_config(config: CliChannelConfig) -> Self {
        Self {
            base: Arc::new(ChannelBase::new("cli")),
            config,
            reader: RwLock::new(None),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, engine: Arc<Conversation>) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Starting).await;

        let base = Arc::clone(&self.base);
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = drive(stdin, &engine, &base, &config).await {
                base.note_failure(e).await;
            }
            debug!("CLI reader finished");
        });
        *self.reader.write().await = Some(handle);

        self.base.set_state(ChannelState::Listening).await;
        info!("CLI channel started");

        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopping).await;

        if let Some(handle) = self.reader.write().await.take() {
            handle.abort();
        }

        self.base.set_state(ChannelState::Idle).await;
        info!("CLI channel stopped");

        Ok(())
    }

    async fn status(&self) -> ChannelStatus {
        self.base.status().await
    }
}

/// Run an interactive CLI session in the foreground.
///
/// Returns when stdin closes or the user types `exit`.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub async fn run_interactive(engine: &Conversation, config: CliChannelConfig) -> ChannelResult<()> {
    let base = ChannelBase::new("cli");
    base.set_state(ChannelState::Listening).await;
    let stdin = BufReader::new(tokio::io::stdin());
    drive(stdin, engine, &Arc::new(base), &config).await
}

/// Feed every line of `reader` to the engine.
#[allow(clippy::print_stdout)] // CLI intentionally prints to stdout
async fn drive<R>(
    reader: R,
    engine: &Conversation,
    base: &Arc<ChannelBase>,
    config: &CliChannelConfig,
) -> ChannelResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let identity = Identity::new(config.identity.clone());
    let transport = TerminalTransport::new(config.out_dir.clone(), Arc::clone(base));
    let mut lines = reader.lines();

    print!("{}", config.prompt);
    let _ = io::stdout().flush();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ChannelError::Internal(e.to_string()))?
    {
        if is_exit(&line) {
            break;
        }

        if let Some(event) = parse_line(&identity, &line) {
            base.dispatch(engine, event, &transport).await;
        }

        print!("{}", config.prompt);
        let _ = io::stdout().flush();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio::artifact::ArtifactStore;
    use folio::config::FetchSettings;
    use folio::flow::EngineSettings;
    use folio::locale::MessageKey;
    use folio::store::HttpImageStore;
    use image::{ImageFormat, Rgb, RgbImage};

    fn engine(staging: &std::path::Path) -> Arc<Conversation> {
        let store = HttpImageStore::new(FetchSettings::default()).unwrap();
        Arc::new(Conversation::new(
            Arc::new(store),
            ArtifactStore::new(staging),
            EngineSettings::default(),
        ))
    }

    #[test]
    fn test_config_builder() {
        let config = CliChannelConfig::new()
            .prompt(">> ")
            .identity("local")
            .out_dir("/tmp/out");

        assert_eq!(config.prompt, ">> ");
        assert_eq!(config.identity, "local");
        assert_eq!(config.out_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_parse_line() {
        let id = Identity::from("cli");
        assert!(parse_line(&id, "   ").is_none());
        assert!(matches!(
            parse_line(&id, "@ /tmp/a.png"),
            Some(InboundEvent::ImageSubmitted {
                locator: Locator::Path(_),
                ..
            })
        ));
        assert!(matches!(
            parse_line(&id, "@https://example.com/a.jpg"),
            Some(InboundEvent::ImageSubmitted {
                locator: Locator::Url(_),
                ..
            })
        ));
        assert!(matches!(
            parse_line(&id, "Finish"),
            Some(InboundEvent::Keyword { .. })
        ));
        assert!(is_exit(" quit "));
        assert!(!is_exit("quitting"));
    }

    #[test]
    fn test_render_keyboard() {
        let reply = Reply::Keyboard {
            key: MessageKey::PdfReady,
            text: "Ready".to_string(),
            choices: vec!["Yes".to_string(), "No".to_string()],
        };
        assert_eq!(
            TerminalTransport::render(&reply).as_deref(),
            Some("Ready\n[ Yes | No ]")
        );
    }

    #[tokio::test]
    async fn test_cli_channel_stop_before_start() {
        let channel = CliChannel::new();
        assert_eq!(channel.name(), "cli");
        assert_eq!(channel.status().await.state, ChannelState::Idle);

        channel.stop().await.unwrap();
        let status = channel.status().await;
        assert_eq!(status.state, ChannelState::Idle);
        assert_eq!(status.traffic.events, 0);
    }

    #[tokio::test]
    async fn test_drive_saves_document() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let image_path = out.path().join("page.png");
        RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]))
            .save_with_format(&image_path, ImageFormat::Png)
            .unwrap();

        let script = format!(
            "/start\nEnglish\n@{}\nFinish\nYes\nscan\nexit\nFinish\n",
            image_path.display()
        );
        let engine = engine(staging.path());
        let base = Arc::new(ChannelBase::new("cli"));
        let config = CliChannelConfig::new().identity("local").out_dir(out.path());

        drive(script.as_bytes(), &engine, &base, &config)
            .await
            .unwrap();

        assert!(out.path().join("scan.pdf").exists());
        assert!(!engine.sessions().contains(&Identity::from("local")).await);
        let traffic = base.status().await.traffic;
        assert_eq!(traffic.events, 6);
        assert_eq!(traffic.images, 1);
        assert_eq!(traffic.documents, 1);
    }
}
