//! Telegram channel implementation using teloxide.
//!
//! Text messages are classified into conversation events. Photos (largest
//! size) and image documents become [`Locator::Url`]s pointing at the Bot
//! API file endpoint; the bytes are fetched only when the user finishes the
//! batch. Replies become messages, one-time reply keyboards and documents.
//!
//! # Setup
//!
//! 1. Create a bot via [@BotFather](https://t.me/botfather)
//! 2. Get your bot token
//! 3. Put it in the config file or `TELEGRAM_BOT_TOKEN`
//!
//! # Example
//!
//! ```rust,ignore
//! use folio_bot::channels::{TelegramChannel, telegram::TelegramChannelConfig};
//!
//! let config = TelegramChannelConfig::new("YOUR_BOT_TOKEN").allow_user(123456789);
//! let telegram = TelegramChannel::new(config);
//! telegram.start(engine).await?;
//! ```

use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus};
use async_trait::async_trait;
use folio::error::{ChannelError, ChannelResult};
use folio::events::{Identity, InboundEvent, OutboundReply, Reply};
use folio::flow::Conversation;
use folio::store::Locator;
use folio::transport::Transport;
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{
    InputFile, KeyboardButton, KeyboardMarkup, MediaKind, MessageKind,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Base URL of the Bot API file endpoint.
pub const FILE_API_BASE: &str = "https://api.telegram.org/file";

/// Separates chat and user in a group member's identity.
const MEMBER_SEPARATOR: char = ':';

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramChannelConfig {
    /// Bot token from @BotFather.
    pub token: String,
    /// Allowed user IDs. Empty means allow all.
    pub allowed_users: HashSet<i64>,
}

// The token grants full control of the bot.
impl std::fmt::Debug for TelegramChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannelConfig")
            .field("token", &"<redacted>")
            .field("allowed_users", &self.allowed_users)
            .finish()
    }
}

impl TelegramChannelConfig {
    /// Create a new Telegram channel config with the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            allowed_users: HashSet::new(),
        }
    }

    /// Try to create config from environment variable.
    #[must_use]
    pub fn try_from_env() -> Option<Self> {
        std::env::var(folio::config::TOKEN_ENV).ok().map(Self::new)
    }

    /// Add an allowed user ID.
    #[must_use]
    pub fn allow_user(mut self, user_id: i64) -> Self {
        self.allowed_users.insert(user_id);
        self
    }

    /// Add multiple allowed user IDs.
    #[must_use]
    pub fn allow_users(self, user_ids: impl IntoIterator<Item = i64>) -> Self {
        user_ids.into_iter().fold(self, Self::allow_user)
    }

    /// Whether a message from `user_id` may start or continue a session.
    ///
    /// Messages without a sender pass only when the allowlist is empty.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: Option<i64>) -> bool {
        self.allowed_users.is_empty()
            || user_id.is_some_and(|id| self.allowed_users.contains(&id))
    }

    /// Download URL for a file path returned by `getFile`.
    #[must_use]
    pub fn file_url(&self, file_path: &str) -> String {
        format!("{FILE_API_BASE}/bot{}/{file_path}", self.token)
    }
}

/// Renders engine replies into a Telegram chat.
///
/// Replies go to the chat encoded in the identity, see [`identity_of`].
#[derive(Debug, Clone)]
pub struct TelegramReplier {
    bot: Bot,
    base: Arc<ChannelBase>,
}

impl TelegramReplier {
    /// Create a replier for `bot`.
    #[must_use]
    pub const fn new(bot: Bot, base: Arc<ChannelBase>) -> Self {
        Self { bot, base }
    }
}

/// Conversation identity of `user_id` writing in `chat_id`.
///
/// A private chat is keyed by its id, which equals the user's. In a group
/// every member gets their own session, keyed `<chat>:<user>`.
#[must_use]
pub fn identity_of(chat_id: i64, user_id: Option<i64>) -> Identity {
    match user_id {
        Some(user) if user != chat_id => {
            Identity::new(format!("{chat_id}{MEMBER_SEPARATOR}{user}"))
        }
        _ => Identity::from(chat_id),
    }
}

/// Chat that replies for `identity` go to.
fn chat_id_of(identity: &Identity) -> ChannelResult<ChatId> {
    let raw = identity.as_str();
    let chat = raw.split_once(MEMBER_SEPARATOR).map_or(raw, |(chat, _)| chat);
    chat.parse::<i64>()
        .map(ChatId)
        .map_err(|_| ChannelError::send(format!("invalid chat ID: {identity}")))
}

/// One-row, one-time reply keyboard.
fn reply_keyboard(choices: &[String]) -> KeyboardMarkup {
    let row: Vec<KeyboardButton> = choices.iter().map(KeyboardButton::new).collect();
    KeyboardMarkup::new(vec![row])
        .one_time_keyboard()
        .resize_keyboard()
}

#[async_trait]
impl Transport for TelegramReplier {
    async fn send(&self, reply: &OutboundReply) -> ChannelResult<()> {
        let chat_id = chat_id_of(&reply.identity)?;

        let is_document = matches!(reply.reply, Reply::Document { .. });
        let result = match &reply.reply {
            Reply::Text { text, .. } => self.bot.send_message(chat_id, text.clone()).await.map(drop),
            Reply::Keyboard { text, choices, .. } => self
                .bot
                .send_message(chat_id, text.clone())
                .reply_markup(reply_keyboard(choices))
                .await
                .map(drop),
            Reply::Document { file_name, bytes } => self
                .bot
                .send_document(
                    chat_id,
                    InputFile::memory(bytes.clone()).file_name(file_name.clone()),
                )
                .await
                .map(drop),
        };

        match result {
            Ok(()) => {
                if is_document {
                    self.base.note_document().await;
                }
                Ok(())
            }
            Err(e) => {
                let error = ChannelError::send(e.to_string());
                self.base.note_failure(&error).await;
                Err(error)
            }
        }
    }
}

/// What a Telegram message carries, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Text(String),
    Image(String),
}

/// Whether a document's MIME type is one the assembler accepts.
fn is_image_mime(mime: &str) -> bool {
    matches!(mime, "image/jpeg" | "image/png")
}

fn payload_of(msg: &Message) -> Option<Payload> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    match &common.media_kind {
        MediaKind::Text(text) => Some(Payload::Text(text.text.clone())),
        MediaKind::Photo(photo) => photo
            .photo
            .iter()
            .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
            .map(|size| Payload::Image(size.file.id.clone())),
        MediaKind::Document(doc) => doc
            .document
            .mime_type
            .as_ref()
            .filter(|mime| is_image_mime(mime.essence_str()))
            .map(|_| Payload::Image(doc.document.file.id.clone())),
        _ => None,
    }
}

/// Telegram channel implementation.
pub struct TelegramChannel {
    base: Arc<ChannelBase>,
    config: TelegramChannelConfig,
    shutdown: RwLock<Option<ShutdownToken>>,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Create a new Telegram channel with the given configuration.
    #[must_use]
    pub fn new(config: TelegramChannelConfig) -> Self {
        Self {
            base: Arc::new(ChannelBase::new("telegram")),
            config,
            shutdown: RwLock::new(None),
        }
    }

    /// Translate one message and hand it to the engine.
    async fn on_message(
        bot: Bot,
        msg: Message,
        engine: Arc<Conversation>,
        base: Arc<ChannelBase>,
        config: TelegramChannelConfig,
    ) {
        #[allow(clippy::cast_possible_wrap)] // User ID won't exceed i64 max
        let user_id = msg.from.as_ref().map(|u| u.id.0 as i64);
        let chat_id = msg.chat.id.0;

        if !config.is_user_allowed(user_id) {
            debug!(?user_id, chat_id, "message from unauthorized user");
            return;
        }

        let Some(payload) = payload_of(&msg) else {
            debug!(chat_id, "ignoring unsupported message");
            return;
        };

        let identity = identity_of(chat_id, user_id);
        let event = match payload {
            Payload::Text(text) => InboundEvent::from_text(identity, text),
            Payload::Image(file_id) => match bot.get_file(file_id).await {
                Ok(file) => InboundEvent::image(identity, Locator::Url(config.file_url(&file.path))),
                Err(e) => {
                    warn!(%identity, "failed to resolve telegram file");
                    base.note_failure(e).await;
                    return;
                }
            },
        };

        let replier = TelegramReplier::new(bot, Arc::clone(&base));
        base.dispatch(&engine, event, &replier).await;
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, engine: Arc<Conversation>) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Starting).await;

        if self.config.token.trim().is_empty() {
            self.base.set_state(ChannelState::Failed).await;
            return Err(ChannelError::start("telegram token is empty"));
        }

        let bot = Bot::new(&self.config.token);
        let base = Arc::clone(&self.base);
        let config = self.config.clone();

        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let engine = Arc::clone(&engine);
            let base = Arc::clone(&base);
            let config = config.clone();

            async move {
                Self::on_message(bot, msg, engine, base, config).await;
                Ok::<(), teloxide::RequestError>(())
            }
        });

        // Updates of one chat are handled in order; chats run concurrently.
        // Group members share a chat, so their turns are serialized here and
        // again per identity by the session table.
        let mut dispatcher = Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build();
        *self.shutdown.write().await = Some(dispatcher.shutdown_token());

        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });

        self.base.set_state(ChannelState::Listening).await;
        info!("Telegram channel started");

        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopping).await;

        let token = self.shutdown.write().await.take();
        if let Some(token) = token {
            // Fails only if the dispatcher is idle or already stopping.
            if let Ok(done) = token.shutdown() {
                done.await;
            }
        }

        self.base.set_state(ChannelState::Idle).await;
        info!("Telegram channel stopped");

        Ok(())
    }

    async fn status(&self) -> ChannelStatus {
        self.base.status().await
    }
}
