//! Inbound events and outbound replies.
//!
//! Transports translate their native updates into [`InboundEvent`]s and
//! render [`OutboundReply`]s back to the user.

use crate::locale::{Locale, MessageKey};
use crate::store::Locator;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command that restarts the conversation.
pub const RESTART_COMMAND: &str = "/start";

/// Opaque per-user key supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Wrap a transport-specific user key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Control keywords with dedicated handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// Close the batch and assemble the document.
    Finish,
    /// Accept the rename offer.
    Yes,
    /// Decline the rename offer.
    No,
}

impl Keyword {
    /// Match a trimmed, case-insensitive keyword.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("finish") {
            Some(Self::Finish)
        } else if text.eq_ignore_ascii_case("yes") {
            Some(Self::Yes)
        } else if text.eq_ignore_ascii_case("no") {
            Some(Self::No)
        } else {
            None
        }
    }

    /// Keyboard label for this keyword.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Finish => "Finish",
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

/// An event delivered by a transport.
///
/// Textual variants keep the raw text, because in the rename stage every
/// text is a file name candidate.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// The restart command.
    Restart {
        /// Sender.
        identity: Identity,
    },
    /// A language label from the keyboard.
    LanguageSelected {
        /// Sender.
        identity: Identity,
        /// Matched locale.
        locale: Locale,
        /// Raw text.
        text: String,
    },
    /// An image reference.
    ImageSubmitted {
        /// Sender.
        identity: Identity,
        /// Where to fetch the bytes from.
        locator: Locator,
    },
    /// A control keyword.
    Keyword {
        /// Sender.
        identity: Identity,
        /// Matched keyword.
        keyword: Keyword,
        /// Raw text.
        text: String,
    },
    /// Any other text.
    FreeText {
        /// Sender.
        identity: Identity,
        /// Raw text.
        text: String,
    },
}

impl InboundEvent {
    /// Classify a text message.
    ///
    /// Order: restart command, language label, keyword, free text.
    pub fn from_text(identity: impl Into<Identity>, text: impl Into<String>) -> Self {
        let identity = identity.into();
        let text = text.into();

        if is_restart_command(&text) {
            return Self::Restart { identity };
        }
        if let Some(locale) = Locale::from_label(&text) {
            return Self::LanguageSelected {
                identity,
                locale,
                text,
            };
        }
        if let Some(keyword) = Keyword::parse(&text) {
            return Self::Keyword {
                identity,
                keyword,
                text,
            };
        }
        Self::FreeText { identity, text }
    }

    /// Image submission.
    pub fn image(identity: impl Into<Identity>, locator: Locator) -> Self {
        Self::ImageSubmitted {
            identity: identity.into(),
            locator,
        }
    }

    /// Sender of the event.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        match self {
            Self::Restart { identity }
            | Self::LanguageSelected { identity, .. }
            | Self::ImageSubmitted { identity, .. }
            | Self::Keyword { identity, .. }
            | Self::FreeText { identity, .. } => identity,
        }
    }

    /// Raw text of a textual event.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::LanguageSelected { text, .. }
            | Self::Keyword { text, .. }
            | Self::FreeText { text, .. } => Some(text),
            Self::Restart { .. } | Self::ImageSubmitted { .. } => None,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Restart { .. } => "restart",
            Self::LanguageSelected { .. } => "language",
            Self::ImageSubmitted { .. } => "image",
            Self::Keyword { .. } => "keyword",
            Self::FreeText { .. } => "text",
        }
    }
}

/// `/start`, optionally addressed as `/start@botname` and followed by a payload.
fn is_restart_command(text: &str) -> bool {
    let Some(command) = text.split_whitespace().next() else {
        return false;
    };
    let command = command.split('@').next().unwrap_or(command);
    command.eq_ignore_ascii_case(RESTART_COMMAND)
}

/// What the engine wants the transport to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain localized text.
    Text {
        /// Message key, kept for transports and tests.
        key: MessageKey,
        /// Rendered text.
        text: String,
    },
    /// Localized text with a one-time reply keyboard.
    Keyboard {
        /// Message key.
        key: MessageKey,
        /// Rendered text.
        text: String,
        /// Button labels, one row.
        choices: Vec<String>,
    },
    /// A document to deliver.
    Document {
        /// File name shown to the user.
        file_name: String,
        /// Document bytes.
        bytes: Vec<u8>,
    },
}

impl Reply {
    /// Message key of a textual reply.
    #[must_use]
    pub const fn key(&self) -> Option<MessageKey> {
        match self {
            Self::Text { key, .. } | Self::Keyboard { key, .. } => Some(*key),
            Self::Document { .. } => None,
        }
    }
}

/// A reply addressed to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    /// Recipient.
    pub identity: Identity,
    /// Payload.
    pub reply: Reply,
}

impl OutboundReply {
    /// Localized text.
    #[must_use]
    pub fn text(identity: &Identity, locale: Locale, key: MessageKey) -> Self {
        Self {
            identity: identity.clone(),
            reply: Reply::Text {
                key,
                text: locale.text(key).to_string(),
            },
        }
    }

    /// Localized text with a keyboard.
    #[must_use]
    pub fn keyboard(
        identity: &Identity,
        locale: Locale,
        key: MessageKey,
        choices: Vec<String>,
    ) -> Self {
        Self {
            identity: identity.clone(),
            reply: Reply::Keyboard {
                key,
                text: locale.text(key).to_string(),
                choices,
            },
        }
    }

    /// Document delivery.
    #[must_use]
    pub fn document(identity: &Identity, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            identity: identity.clone(),
            reply: Reply::Document {
                file_name: file_name.into(),
                bytes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_restart() {
        assert!(matches!(
            InboundEvent::from_text(1, "/start"),
            InboundEvent::Restart { .. }
        ));
        assert!(matches!(
            InboundEvent::from_text(1, "/start@folio_bot payload"),
            InboundEvent::Restart { .. }
        ));
        assert!(matches!(
            InboundEvent::from_text(1, "/started"),
            InboundEvent::FreeText { .. }
        ));
    }

    #[test]
    fn test_classify_language_and_keywords() {
        match InboundEvent::from_text(7, "Polski") {
            InboundEvent::LanguageSelected { locale, .. } => assert_eq!(locale, Locale::Pl),
            other => panic!("unexpected {other:?}"),
        }
        match InboundEvent::from_text(7, "  FINISH ") {
            InboundEvent::Keyword { keyword, text, .. } => {
                assert_eq!(keyword, Keyword::Finish);
                assert_eq!(text, "  FINISH ");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            InboundEvent::from_text(7, "no"),
            InboundEvent::Keyword {
                keyword: Keyword::No,
                ..
            }
        ));
    }

    #[test]
    fn test_finish_is_not_a_substring_match() {
        assert!(matches!(
            InboundEvent::from_text(7, "finished_report"),
            InboundEvent::FreeText { .. }
        ));
    }

    #[test]
    fn test_identity_and_text_accessors() {
        let event = InboundEvent::from_text(42, "hello");
        assert_eq!(event.identity().as_str(), "42");
        assert_eq!(event.text(), Some("hello"));
        assert_eq!(event.kind(), "text");

        let restart = InboundEvent::from_text(42, "/start");
        assert_eq!(restart.text(), None);
    }

    #[test]
    fn test_outbound_text_renders_locale() {
        let id = Identity::from(5);
        let out = OutboundReply::text(&id, Locale::En, MessageKey::NoImages);
        assert_eq!(out.reply.key(), Some(MessageKey::NoImages));
        assert_eq!(
            out.reply,
            Reply::Text {
                key: MessageKey::NoImages,
                text: "No images received. Please send images first.".to_string(),
            }
        );
    }
}
