//! Channel trait and the bookkeeping shared by chat front ends.
//!
//! A channel connects one messaging platform to the [`Conversation`] engine:
//! it turns platform updates into [`InboundEvent`]s and renders the engine's
//! replies through its own [`Transport`]. All channels feed the same engine,
//! so a user keeps one session regardless of which loop delivered the event.

use async_trait::async_trait;
use folio::error::ChannelResult;
use folio::events::InboundEvent;
use folio::flow::Conversation;
use folio::transport::Transport;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Not started, or stopped.
    #[default]
    Idle,
    /// Connecting to the platform.
    Starting,
    /// Receiving updates.
    Listening,
    /// Draining in-flight updates.
    Stopping,
    /// Could not start.
    Failed,
}

/// What a channel has moved through the engine so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Traffic {
    /// Events handed to the engine.
    pub events: u64,
    /// Of those, image submissions.
    pub images: u64,
    /// Documents delivered back to users.
    pub documents: u64,
    /// Failed engine turns and platform calls.
    pub failures: u64,
}

/// Snapshot of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    /// Channel name.
    pub name: String,
    /// Current state.
    pub state: ChannelState,
    /// Counters.
    pub traffic: Traffic,
    /// Most recent failure, if any.
    pub last_failure: Option<String>,
}

impl ChannelStatus {
    /// Listening and nothing has failed yet.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == ChannelState::Listening && self.last_failure.is_none()
    }
}

/// A platform front end.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique name, used in logs and status output.
    fn name(&self) -> &str;

    /// Begin feeding events to `engine`.
    ///
    /// Spawns the platform loop and returns once it is running.
    async fn start(&self, engine: Arc<Conversation>) -> ChannelResult<()>;

    /// Stop the platform loop.
    async fn stop(&self) -> ChannelResult<()>;

    /// Current status.
    async fn status(&self) -> ChannelStatus;
}

/// Owns the registered channels and starts them against one engine.
pub struct ChannelManager {
    channels: RwLock<Vec<Box<dyn Channel>>>,
    engine: Arc<Conversation>,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Create a manager feeding `engine`.
    #[must_use]
    pub fn new(engine: Arc<Conversation>) -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
            engine,
        }
    }

    /// Add a channel. It is started by the next [`start_all`](Self::start_all).
    pub async fn register(&self, channel: impl Channel + 'static) {
        info!(channel = %channel.name(), "channel registered");
        self.channels.write().await.push(Box::new(channel));
    }

    /// Number of registered channels.
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Whether no channel is registered.
    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }

    /// Start every channel and return how many came up.
    ///
    /// A channel that fails to start is logged and skipped.
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        for channel in self.channels.read().await.iter() {
            match channel.start(Arc::clone(&self.engine)).await {
                Ok(()) => started += 1,
                Err(e) => error!(channel = %channel.name(), error = %e, "channel failed to start"),
            }
        }
        started
    }

    /// Stop every channel.
    pub async fn stop_all(&self) {
        for channel in self.channels.read().await.iter() {
            if let Err(e) = channel.stop().await {
                warn!(channel = %channel.name(), error = %e, "channel failed to stop cleanly");
            }
        }
    }

    /// Status of every channel, in registration order.
    pub async fn statuses(&self) -> Vec<ChannelStatus> {
        let channels = self.channels.read().await;
        let mut out = Vec::with_capacity(channels.len());
        for channel in channels.iter() {
            out.push(channel.status().await);
        }
        out
    }
}

/// State and counters one channel shares with its transport.
pub struct ChannelBase {
    name: String,
    state: RwLock<ChannelState>,
    ledger: RwLock<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    traffic: Traffic,
    last_failure: Option<String>,
}

impl fmt::Debug for ChannelBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ChannelBase {
    /// Create an idle base.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ChannelState::Idle),
            ledger: RwLock::new(Ledger::default()),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    /// Move to `state`.
    pub async fn set_state(&self, state: ChannelState) {
        *self.state.write().await = state;
        debug!(channel = %self.name, ?state, "channel state changed");
    }

    /// Count a delivered document.
    pub async fn note_document(&self) {
        self.ledger.write().await.traffic.documents += 1;
    }

    /// Count a failure and keep its message.
    pub async fn note_failure(&self, reason: impl fmt::Display) {
        let reason = reason.to_string();
        warn!(channel = %self.name, %reason, "channel failure");
        let mut ledger = self.ledger.write().await;
        ledger.traffic.failures += 1;
        ledger.last_failure = Some(reason);
    }

    /// Snapshot for status output.
    pub async fn status(&self) -> ChannelStatus {
        let state = self.state().await;
        let ledger = self.ledger.read().await;
        ChannelStatus {
            name: self.name.clone(),
            state,
            traffic: ledger.traffic,
            last_failure: ledger.last_failure.clone(),
        }
    }

    /// Hand one event to the engine.
    ///
    /// A failed turn means a reply could not be delivered; it is counted
    /// and never propagated back into the platform loop.
    pub async fn dispatch(
        &self,
        engine: &Conversation,
        event: InboundEvent,
        transport: &dyn Transport,
    ) {
        {
            let mut ledger = self.ledger.write().await;
            ledger.traffic.events += 1;
            if matches!(event, InboundEvent::ImageSubmitted { .. }) {
                ledger.traffic.images += 1;
            }
        }

        let identity = event.identity().clone();
        let kind = event.kind();
        debug!(channel = %self.name, %identity, kind, "dispatching event");

        if let Err(e) = engine.handle(event, transport).await {
            self.note_failure(format!("{kind} from {identity}: {e}"))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio::artifact::ArtifactStore;
    use folio::error::{ChannelError, FetchResult};
    use folio::events::Identity;
    use folio::flow::EngineSettings;
    use folio::locale::MessageKey;
    use folio::store::{ImageStore, Locator};
    use folio::transport::RecordingTransport;

    struct NoImages;

    #[async_trait]
    impl ImageStore for NoImages {
        async fn fetch(&self, _locator: &Locator) -> FetchResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn engine(dir: &std::path::Path) -> Arc<Conversation> {
        Arc::new(Conversation::new(
            Arc::new(NoImages),
            ArtifactStore::new(dir),
            EngineSettings::default(),
        ))
    }

    /// A channel whose start always fails.
    struct Broken(ChannelBase);

    #[async_trait]
    impl Channel for Broken {
        fn name(&self) -> &str {
            self.0.name()
        }

        async fn start(&self, _engine: Arc<Conversation>) -> ChannelResult<()> {
            self.0.set_state(ChannelState::Failed).await;
            Err(ChannelError::start("unreachable platform"))
        }

        async fn stop(&self) -> ChannelResult<()> {
            self.0.set_state(ChannelState::Idle).await;
            Ok(())
        }

        async fn status(&self) -> ChannelStatus {
            self.0.status().await
        }
    }

    #[tokio::test]
    async fn test_dispatch_counts_events_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let base = ChannelBase::new("test");
        base.set_state(ChannelState::Listening).await;
        let transport = RecordingTransport::new();
        let id = Identity::from(11);

        base.dispatch(&engine, InboundEvent::from_text(11, "/start"), &transport)
            .await;
        base.dispatch(&engine, InboundEvent::from_text(11, "English"), &transport)
            .await;
        base.dispatch(
            &engine,
            InboundEvent::image(11, Locator::bytes(vec![0_u8; 4])),
            &transport,
        )
        .await;

        assert_eq!(
            transport.keys_for(&id),
            vec![MessageKey::Start, MessageKey::AskImages, MessageKey::ImageReceived]
        );
        let status = base.status().await;
        assert_eq!(status.traffic.events, 3);
        assert_eq!(status.traffic.images, 1);
        assert_eq!(status.traffic.failures, 0);
        assert!(status.is_healthy());
    }

    #[tokio::test]
    async fn test_failures_mark_channel_unhealthy() {
        let base = ChannelBase::new("test");
        base.set_state(ChannelState::Listening).await;

        base.note_document().await;
        base.note_failure("send_document: timed out").await;

        let status = base.status().await;
        assert_eq!(status.traffic.documents, 1);
        assert_eq!(status.traffic.failures, 1);
        assert_eq!(status.last_failure.as_deref(), Some("send_document: timed out"));
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn test_manager_counts_started_channels() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ChannelManager::new(engine(dir.path()));
        assert!(manager.is_empty().await);
        assert_eq!(manager.start_all().await, 0);

        manager.register(Broken(ChannelBase::new("broken"))).await;
        assert_eq!(manager.len().await, 1);
        assert_eq!(manager.start_all().await, 0);

        let statuses = manager.statuses().await;
        assert_eq!(statuses[0].name, "broken");
        assert_eq!(statuses[0].state, ChannelState::Failed);

        manager.stop_all().await;
        assert_eq!(manager.statuses().await[0].state, ChannelState::Idle);
    }

    #[test]
    fn test_status_serializes_snake_case_state() {
        let status = ChannelStatus {
            name: "cli".into(),
            state: ChannelState::Listening,
            traffic: Traffic::default(),
            last_failure: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "listening");
        assert_eq!(json["traffic"]["events"], 0);
    }
}
