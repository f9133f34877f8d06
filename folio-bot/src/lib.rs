//! Folio Bot - chat front ends for the folio conversation engine.
//!
//! This crate connects messaging platforms to [`folio::flow::Conversation`]:
//! users pick a language, send a batch of images, type `Finish`, and get the
//! images back as one PDF, optionally under a name of their choice.
//!
//! # Architecture
//!
//! - **Channel** ([`channel`]) - Lifecycle and bookkeeping shared by platforms
//! - **Channels** ([`channels`]) - Platform integrations (Telegram, terminal)
//! - **Gateway** ([`gateway`]) - Engine, channels and sweeper wired together
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use folio_bot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gateway = GatewayBuilder::new().load_config(None).await?.build()?;
//!     gateway.run().await
//! }
//! ```
//!
//! # Features
//!
//! - `telegram` - Enable Telegram bot support via teloxide

pub mod channel;
pub mod channels;
pub mod gateway;

/// Prelude module for convenient imports.
pub mod prelude {
    // Engine (re-exported for convenience)
    pub use folio::prelude::*;

    // Channel
    pub use crate::channel::{
        Channel, ChannelBase, ChannelManager, ChannelState, ChannelStatus, Traffic,
    };
    pub use crate::channels::cli::{CliChannelConfig, run_interactive};
    pub use crate::channels::{CliChannel, TerminalTransport};
    #[cfg(feature = "telegram")]
    pub use crate::channels::telegram::{TelegramChannelConfig, identity_of};
    #[cfg(feature = "telegram")]
    pub use crate::channels::{TelegramChannel, TelegramReplier};

    // Gateway
    pub use crate::gateway::{Gateway, GatewayBuilder, GatewayConfig, GatewayStatus};
}
