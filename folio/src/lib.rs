//! Folio - turns a conversation full of images into one PDF.
//!
//! The library holds everything that does not depend on a particular chat
//! platform. Transports feed [`events::InboundEvent`]s into a
//! [`flow::Conversation`] and render the [`events::OutboundReply`]s it sends
//! through their [`transport::Transport`].
//!
//! # Architecture
//!
//! - **Session** ([`session`]) - per-identity conversation records and the concurrent table
//! - **Flow** ([`flow`]) - the conversation state machine
//! - **Assembler** ([`assembler`]) - format sniffing and PDF layout, one page per image
//! - **Artifacts** ([`artifact`]) - staged files with guaranteed cleanup and collision-free renames
//! - **Store** ([`store`]) - image retrieval behind opaque locators
//! - **Locale** ([`locale`]) - the five-language message table
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use folio::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = Conversation::from_config(&load_config().await?)?;
//!     let transport = RecordingTransport::new();
//!     engine.handle(InboundEvent::from_text(1, "English"), &transport).await?;
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod assembler;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod locale;
pub mod session;
pub mod store;
pub mod transport;
pub mod util;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error types (centralized)
    pub use crate::error::{
        ArtifactError, ArtifactResult, AssembleError, AssembleResult, ChannelError,
        ChannelResult, ConfigError, ConfigResult, FetchError, FetchResult,
        FlowError, FlowResult, FolioError, NameIssue, Result,
    };

    // Artifacts
    pub use crate::artifact::{ArtifactStore, RenameRejected, StagedArtifact, validate_name};

    // Assembler
    pub use crate::assembler::{AssembledDocument, PageSize, RasterFormat, assemble, sniff};

    // Config
    pub use crate::config::{
        AssemblySettings, ConfigIssue, FetchSettings, FolioConfig, IssueLevel, SessionSettings,
        StagingSettings, TelegramConfig, config_path, init_config, load_config,
        load_config_from, save_config,
    };

    // Events
    pub use crate::events::{Identity, InboundEvent, Keyword, OutboundReply, Reply};

    // Flow
    pub use crate::flow::{Conversation, EngineSettings};

    // Locale
    pub use crate::locale::{Locale, MessageKey};

    // Session
    pub use crate::session::{
        Session, SessionGuard, SessionTable, SessionView, Stage, StageKind, SweeperHandle,
    };

    // Store
    pub use crate::store::{HttpImageStore, ImageStore, Locator, fetch_all};

    // Transport
    pub use crate::transport::{RecordingTransport, Transport};

    // Utilities
    pub use crate::util::{config_dir, home_dir, staging_dir, timestamp_ms};
}
