//! Outbound side of a channel.

use crate::error::{ChannelError, ChannelResult};
use crate::events::{Identity, OutboundReply, Reply};
use crate::locale::MessageKey;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Renders replies to users.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one reply.
    async fn send(&self, reply: &OutboundReply) -> ChannelResult<()>;
}

/// Transport that records every reply in memory.
///
/// Used by tests and by tooling that inspects a conversation offline.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundReply>>>,
    fail_documents: Arc<AtomicBool>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make document sends fail (or succeed again).
    pub fn fail_documents(&self, fail: bool) {
        self.fail_documents.store(fail, Ordering::SeqCst);
    }

    /// Everything sent so far.
    #[must_use]
    pub fn replies(&self) -> Vec<OutboundReply> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replies addressed to `identity`.
    #[must_use]
    pub fn replies_for(&self, identity: &Identity) -> Vec<Reply> {
        self.replies()
            .into_iter()
            .filter(|r| &r.identity == identity)
            .map(|r| r.reply)
            .collect()
    }

    /// Message keys of the textual replies addressed to `identity`.
    #[must_use]
    pub fn keys_for(&self, identity: &Identity) -> Vec<MessageKey> {
        self.replies_for(identity)
            .iter()
            .filter_map(Reply::key)
            .collect()
    }

    /// Documents delivered to `identity`, as `(file_name, bytes)`.
    #[must_use]
    pub fn documents_for(&self, identity: &Identity) -> Vec<(String, Vec<u8>)> {
        self.replies_for(identity)
            .into_iter()
            .filter_map(|r| match r {
                Reply::Document { file_name, bytes } => Some((file_name, bytes)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded replies.
    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, reply: &OutboundReply) -> ChannelResult<()> {
        if matches!(reply.reply, Reply::Document { .. }) && self.fail_documents.load(Ordering::SeqCst)
        {
            return Err(ChannelError::send("document rejected"));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reply.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;

    #[tokio::test]
    async fn test_records_per_identity() {
        let transport = RecordingTransport::new();
        let a = Identity::from(1);
        let b = Identity::from(2);

        transport
            .send(&OutboundReply::text(&a, Locale::En, MessageKey::Start))
            .await
            .unwrap();
        transport
            .send(&OutboundReply::document(&b, "x.pdf", vec![1, 2]))
            .await
            .unwrap();

        assert_eq!(transport.keys_for(&a), vec![MessageKey::Start]);
        assert!(transport.keys_for(&b).is_empty());
        assert_eq!(
            transport.documents_for(&b),
            vec![("x.pdf".to_string(), vec![1, 2])]
        );
    }

    #[tokio::test]
    async fn test_failing_documents() {
        let transport = RecordingTransport::new();
        transport.fail_documents(true);
        let id = Identity::from(1);
        assert!(
            transport
                .send(&OutboundReply::document(&id, "x.pdf", Vec::new()))
                .await
                .is_err()
        );
        assert!(transport.replies().is_empty());
    }
}
