//! Unified error types for folio.
//!
//! Each concern owns a small error enum; all of them convert into the main
//! [`FolioError`] type. The conversation taxonomy lives in [`FlowError`],
//! whose variants map onto user-facing [`MessageKey`]s.

use crate::locale::MessageKey;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for folio operations.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    /// Conversation flow error.
    #[error("flow: {0}")]
    Flow(#[from] FlowError),

    /// Document assembly error.
    #[error("assemble: {0}")]
    Assemble(#[from] AssembleError),

    /// Image fetch error.
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    /// Artifact staging error.
    #[error("artifact: {0}")]
    Artifact(#[from] ArtifactError),

    /// Transport channel error.
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl FolioError {
    /// Create a config error from a string.
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }
}

/// Result type alias for folio operations.
pub type Result<T> = std::result::Result<T, FolioError>;

// ============================================================================
// Conversation Flow Errors
// ============================================================================

/// Why a rename candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameIssue {
    /// Nothing left after trimming.
    Empty,
    /// Uses the default-name prefix, or contains a path separator, a
    /// reserved or a control character.
    Reserved,
    /// Longer than the allowed maximum.
    TooLong(usize),
    /// An artifact with this name already exists.
    Exists(String),
}

impl fmt::Display for NameIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("name is empty"),
            Self::Reserved => f.write_str("name is reserved or contains reserved characters"),
            Self::TooLong(max) => write!(f, "name is longer than {max} characters"),
            Self::Exists(name) => write!(f, "'{name}' already exists"),
        }
    }
}

/// Conversation-level failures.
///
/// Every variant is recoverable by replying to the user; see
/// [`FlowError::message_key`].
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Event for an identity that has not selected a language.
    #[error("no session")]
    NoSession,

    /// Finish requested with zero images.
    #[error("empty batch")]
    EmptyBatch,

    /// Batch would exceed the configured image limit.
    #[error("batch limit of {limit} images reached")]
    TooManyImages {
        /// Configured maximum.
        limit: usize,
    },

    /// Image retrieval failed.
    #[error("image #{index}: fetch failed: {reason}")]
    Fetch {
        /// Zero-based position in the batch.
        index: usize,
        /// Underlying failure.
        reason: String,
    },

    /// A supported signature was found but the image did not decode.
    #[error("image #{index}: decode failed: {reason}")]
    Decode {
        /// Zero-based position in the batch.
        index: usize,
        /// Underlying failure.
        reason: String,
    },

    /// No supported signature matched.
    #[error("image #{index}: unsupported format ({format})")]
    UnsupportedFormat {
        /// Zero-based position in the batch.
        index: usize,
        /// Best guess at what the bytes are.
        format: &'static str,
    },

    /// The document writer failed.
    #[error("assembly failed: {0}")]
    Assembly(String),

    /// Rename target rejected.
    #[error("invalid name: {0}")]
    NameConflict(NameIssue),

    /// Transport send failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A bounded operation ran out of time.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

impl FlowError {
    /// The localized message shown to the user for this failure.
    #[must_use]
    pub const fn message_key(&self) -> MessageKey {
        match self {
            Self::NoSession => MessageKey::SelectLanguage,
            Self::EmptyBatch => MessageKey::NoImages,
            Self::TooManyImages { .. } => MessageKey::TooManyImages,
            Self::Fetch { .. } => MessageKey::FetchFailed,
            Self::Decode { .. } | Self::UnsupportedFormat { .. } => MessageKey::BadImage,
            Self::Assembly(_) | Self::Timeout(..) => MessageKey::ConversionFailed,
            Self::NameConflict(_) => MessageKey::InvalidName,
            Self::Delivery(_) => MessageKey::DeliveryFailed,
        }
    }

    /// Index of the image that caused the failure, if any.
    #[must_use]
    pub const fn image_index(&self) -> Option<usize> {
        match self {
            Self::Fetch { index, .. }
            | Self::Decode { index, .. }
            | Self::UnsupportedFormat { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<AssembleError> for FlowError {
    fn from(err: AssembleError) -> Self {
        match err {
            AssembleError::Empty => Self::EmptyBatch,
            AssembleError::Decode { index, reason } => Self::Decode { index, reason },
            AssembleError::Unsupported { index, format } => {
                Self::UnsupportedFormat { index, format }
            }
            AssembleError::Encode(reason) => Self::Assembly(reason),
        }
    }
}

/// Result type for conversation flow operations.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

// ============================================================================
// Assembly Errors
// ============================================================================

/// Error type for document assembly.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// No images were supplied.
    #[error("no images to assemble")]
    Empty,

    /// No supported signature matched.
    #[error("image #{index}: unsupported format ({format})")]
    Unsupported {
        /// Zero-based position in the batch.
        index: usize,
        /// Best guess at what the bytes are.
        format: &'static str,
    },

    /// The image claimed a supported format but could not be read.
    #[error("image #{index}: {reason}")]
    Decode {
        /// Zero-based position in the batch.
        index: usize,
        /// Underlying failure.
        reason: String,
    },

    /// Serializing the document failed.
    #[error("encode: {0}")]
    Encode(String),
}

impl AssembleError {
    /// Create a decode error for the image at `index`.
    #[inline]
    pub fn decode(index: usize, reason: impl fmt::Display) -> Self {
        Self::Decode {
            index,
            reason: reason.to_string(),
        }
    }
}

/// Result type for assembly operations.
pub type AssembleResult<T> = std::result::Result<T, AssembleError>;

// ============================================================================
// Fetch Errors
// ============================================================================

/// Error type for image retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed.
    #[error("request: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("HTTP {0}")]
    Status(u16),

    /// Reading a local file failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The image exceeds the configured size limit.
    #[error("image of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Observed size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The fetch did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest errors may embed the URL, which can carry a bot token.
        Self::Request(err.without_url().to_string())
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// ============================================================================
// Artifact Errors
// ============================================================================

/// Error type for artifact staging.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Rename target rejected.
    #[error("name: {0}")]
    Name(NameIssue),
}

/// Result type for artifact operations.
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

// ============================================================================
// Channel Errors
// ============================================================================

/// Error type for transport channels.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to start the channel.
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Failed to send a reply.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Internal error.
    #[error("{0}")]
    Internal(String),
}

impl ChannelError {
    /// Create a start failed error.
    #[inline]
    pub fn start(msg: impl Into<String>) -> Self {
        Self::StartFailed(msg.into())
    }

    /// Create a send failed error.
    #[inline]
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing required field.
    #[error("missing: {0}")]
    Missing(String),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a missing field error.
    #[inline]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: FolioError = ChannelError::send("offline").into();
        assert!(matches!(err, FolioError::Channel(_)));

        let err: FolioError = FlowError::EmptyBatch.into();
        assert!(matches!(err, FolioError::Flow(FlowError::EmptyBatch)));
    }

    #[test]
    fn test_assemble_error_maps_to_flow() {
        let flow: FlowError = AssembleError::decode(2, "bad huffman table").into();
        assert!(matches!(flow, FlowError::Decode { index: 2, .. }));
        assert_eq!(flow.image_index(), Some(2));

        let flow: FlowError = AssembleError::Unsupported {
            index: 0,
            format: "gif",
        }
        .into();
        assert_eq!(flow.message_key(), MessageKey::BadImage);
    }

    #[test]
    fn test_message_keys() {
        assert_eq!(FlowError::NoSession.message_key(), MessageKey::SelectLanguage);
        assert_eq!(FlowError::EmptyBatch.message_key(), MessageKey::NoImages);
        assert_eq!(
            FlowError::NameConflict(NameIssue::Empty).message_key(),
            MessageKey::InvalidName
        );
        assert_eq!(
            FlowError::Timeout("assembly", Duration::from_secs(1)).message_key(),
            MessageKey::ConversionFailed
        );
    }
}
