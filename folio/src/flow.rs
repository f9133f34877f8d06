//! Conversation engine.
//!
//! [`Conversation::handle`] interprets one [`InboundEvent`] against the
//! sender's session and answers through a [`Transport`]. The sender's slot in
//! the [`SessionTable`] stays locked for the whole event, so events of one
//! identity never interleave while other identities proceed concurrently.

use crate::artifact::{ArtifactStore, RenameRejected, StagedArtifact};
use crate::assembler::assemble;
use crate::config::FolioConfig;
use crate::error::{ArtifactError, ChannelError, FlowError, FlowResult, Result};
use crate::events::{Identity, InboundEvent, Keyword, OutboundReply};
use crate::locale::{Locale, MessageKey};
use crate::session::{Session, SessionTable, Stage, StageKind, SweeperHandle};
use crate::store::{HttpImageStore, ImageStore, Locator, fetch_all};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Engine limits and defaults.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Largest batch per session.
    pub max_images: usize,
    /// Bound on each image fetch.
    pub fetch_timeout: Duration,
    /// Bound on one assembly run.
    pub assembly_timeout: Duration,
    /// Locale for identities without a session.
    pub default_locale: Locale,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&FolioConfig::default())
    }
}

impl EngineSettings {
    /// Derive the settings from a configuration.
    #[must_use]
    pub const fn from_config(config: &FolioConfig) -> Self {
        Self {
            max_images: config.assembly.max_images,
            fetch_timeout: config.fetch.timeout(),
            assembly_timeout: config.assembly.timeout(),
            default_locale: config.default_locale,
        }
    }
}

/// The conversation state machine.
pub struct Conversation {
    sessions: SessionTable,
    store: Arc<dyn ImageStore>,
    artifacts: ArtifactStore,
    settings: EngineSettings,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("sessions", &self.sessions.len())
            .field("artifacts", &self.artifacts)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Conversation {
    /// Create an engine from its collaborators.
    pub fn new(
        store: Arc<dyn ImageStore>,
        artifacts: ArtifactStore,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions: SessionTable::new(),
            store,
            artifacts,
            settings,
        }
    }

    /// Create an engine with the HTTP image store and the configured staging directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &FolioConfig) -> Result<Self> {
        let store = HttpImageStore::new(config.fetch)?;
        Ok(Self::new(
            Arc::new(store),
            ArtifactStore::new(config.staging.resolve_dir()),
            EngineSettings::from_config(config),
        ))
    }

    /// Session table.
    #[must_use]
    pub const fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Artifact store.
    #[must_use]
    pub const fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start evicting sessions idle for `ttl`, checking every `interval`.
    #[must_use]
    pub fn spawn_sweeper(&self, ttl: Duration, interval: Duration) -> SweeperHandle {
        self.sessions.spawn_sweeper(ttl, interval)
    }

    /// Handle one event to completion.
    ///
    /// Every user-facing failure is answered with a localized reply and
    /// leaves the session consistent.
    ///
    /// # Errors
    ///
    /// Returns the first transport error hit while sending textual replies.
    /// The state transition has been applied regardless.
    pub async fn handle(&self, event: InboundEvent, transport: &dyn Transport) -> Result<()> {
        let identity = event.identity().clone();
        let mut slot = self.sessions.lock(&identity).await;
        let mut out = Replies::new(transport, &identity);

        if let Some(session) = slot.as_mut() {
            session.touch();
        }
        let stage = slot.as_ref().map(Session::stage_kind);
        debug!(%identity, event = event.kind(), ?stage, "handling event");

        match event {
            InboundEvent::Restart { .. } => self.restart(&mut slot, &mut out).await,
            InboundEvent::LanguageSelected { locale, text, .. } => {
                if stage == Some(StageKind::AwaitingNewName) {
                    self.rename(&mut slot, &text, &mut out).await;
                } else {
                    Self::select_language(&mut slot, locale, &mut out).await;
                }
            }
            InboundEvent::ImageSubmitted { locator, .. } => {
                self.add_image(&mut slot, locator, &mut out).await;
            }
            InboundEvent::Keyword { keyword, text, .. } => match (stage, keyword) {
                (Some(StageKind::AwaitingNewName), _) => {
                    self.rename(&mut slot, &text, &mut out).await;
                }
                (Some(StageKind::CollectingImages), Keyword::Finish) => {
                    self.finish(&mut slot, &mut out).await;
                }
                (None | Some(StageKind::AwaitingLanguage), Keyword::Finish) => {
                    out.text(self.locale_of(&slot), MessageKey::NoImages).await;
                }
                (Some(StageKind::AwaitingRenameDecision), Keyword::Yes) => {
                    Self::ask_new_name(&mut slot, &mut out).await;
                }
                (Some(StageKind::AwaitingRenameDecision), Keyword::No) => {
                    Self::deliver_default(&mut slot, &mut out).await;
                }
                _ => self.reprompt(&slot, &mut out).await,
            },
            InboundEvent::FreeText { text, .. } => {
                if stage == Some(StageKind::AwaitingNewName) {
                    self.rename(&mut slot, &text, &mut out).await;
                } else {
                    self.reprompt(&slot, &mut out).await;
                }
            }
        }

        out.finish()
    }

    fn locale_of(&self, slot: &Option<Session>) -> Locale {
        slot.as_ref()
            .map_or(self.settings.default_locale, Session::locale)
    }

    async fn restart(&self, slot: &mut Option<Session>, out: &mut Replies<'_>) {
        let locale = self.locale_of(slot);
        if let Some(previous) = slot.take() {
            info!(
                identity = %out.identity,
                stage = %previous.stage_kind(),
                images = previous.images().len(),
                "session restarted"
            );
            discard(previous).await;
        }
        *slot = Some(Session::awaiting_language(out.identity.clone(), locale));
        out.keyboard(locale, MessageKey::Start, Locale::labels()).await;
    }

    async fn select_language(slot: &mut Option<Session>, locale: Locale, out: &mut Replies<'_>) {
        if let Some(previous) = slot.take() {
            discard(previous).await;
        }
        *slot = Some(Session::new(out.identity.clone(), locale));
        info!(identity = %out.identity, %locale, "session started");
        out.text(locale, MessageKey::AskImages).await;
    }

    async fn add_image(&self, slot: &mut Option<Session>, locator: Locator, out: &mut Replies<'_>) {
        let Some(session) = slot.as_mut() else {
            self.reprompt(&None, out).await;
            return;
        };
        if session.stage_kind() != StageKind::CollectingImages {
            self.reprompt(slot, out).await;
            return;
        }

        let locale = session.locale();
        let limit = self.settings.max_images;
        if session.images().len() >= limit {
            let err = FlowError::TooManyImages { limit };
            debug!(identity = %out.identity, error = %err, "image rejected");
            out.text(locale, err.message_key()).await;
            return;
        }

        let count = session.push_image(locator);
        debug!(identity = %out.identity, count, "image queued");
        out.text(locale, MessageKey::ImageReceived).await;
    }

    async fn finish(&self, slot: &mut Option<Session>, out: &mut Replies<'_>) {
        let Some(session) = slot.as_mut() else {
            return;
        };
        let locale = session.locale();
        if session.images().is_empty() {
            out.text(locale, FlowError::EmptyBatch.message_key()).await;
            return;
        }

        out.text(locale, MessageKey::Converting).await;
        match self.produce(out.identity, session.images()).await {
            Ok(artifact) => {
                session.clear_images();
                session.set_stage(Stage::AwaitingRenameDecision { artifact });
                out.keyboard(locale, MessageKey::PdfReady, decision_choices())
                    .await;
            }
            Err(err) => {
                warn!(identity = %out.identity, error = %err, "conversion failed");
                if matches!(
                    err,
                    FlowError::Decode { .. } | FlowError::UnsupportedFormat { .. }
                ) {
                    if let Some(index) = err.image_index() {
                        session.remove_image(index);
                    }
                }
                out.text(locale, err.message_key()).await;
            }
        }
    }

    /// Fetch, assemble and stage one batch.
    async fn produce(&self, identity: &Identity, locators: &[Locator]) -> FlowResult<StagedArtifact> {
        let images = fetch_all(self.store.as_ref(), locators, self.settings.fetch_timeout).await?;

        let timeout = self.settings.assembly_timeout;
        let task = tokio::task::spawn_blocking(move || assemble(images));
        let document = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(FlowError::Timeout("assembly", timeout)),
            Ok(Err(join)) => return Err(FlowError::Assembly(join.to_string())),
            Ok(Ok(result)) => result?,
        };
        info!(
            %identity,
            pages = document.page_count(),
            size = document.bytes.len(),
            "document assembled"
        );

        self.artifacts
            .stage(identity, &document.bytes)
            .await
            .map_err(|e| FlowError::Assembly(e.to_string()))
    }

    async fn ask_new_name(slot: &mut Option<Session>, out: &mut Replies<'_>) {
        let Some(session) = slot.as_mut() else {
            return;
        };
        match session.take_stage() {
            Stage::AwaitingRenameDecision { artifact } => {
                session.set_stage(Stage::AwaitingNewName { artifact });
                out.text(session.locale(), MessageKey::AskRename).await;
            }
            other => {
                session.set_stage(other);
            }
        }
    }

    async fn deliver_default(slot: &mut Option<Session>, out: &mut Replies<'_>) {
        let Some(mut session) = slot.take() else {
            return;
        };
        let locale = session.locale();
        if let Some(artifact) = session.take_stage().into_artifact() {
            deliver(locale, artifact, out).await;
        }
    }

    async fn rename(&self, slot: &mut Option<Session>, candidate: &str, out: &mut Replies<'_>) {
        let Some(session) = slot.as_mut() else {
            return;
        };
        let locale = session.locale();
        let artifact = match session.take_stage() {
            Stage::AwaitingNewName { artifact } => artifact,
            other => {
                session.set_stage(other);
                return;
            }
        };

        match self.artifacts.rename(artifact, candidate).await {
            Ok(renamed) => {
                deliver(locale, renamed, out).await;
                *slot = None;
            }
            Err(RenameRejected { artifact, error }) => {
                match error {
                    ArtifactError::Name(issue) => {
                        let err = FlowError::NameConflict(issue);
                        info!(identity = %out.identity, error = %err, "rename rejected");
                    }
                    ArtifactError::Io(e) => {
                        warn!(identity = %out.identity, error = %e, "rename failed");
                    }
                }
                session.set_stage(Stage::AwaitingNewName { artifact });
                out.text(locale, MessageKey::InvalidName).await;
            }
        }
    }

    /// Repeat whatever the current stage is waiting for.
    async fn reprompt(&self, slot: &Option<Session>, out: &mut Replies<'_>) {
        let Some(session) = slot else {
            let err = FlowError::NoSession;
            out.keyboard(self.settings.default_locale, err.message_key(), Locale::labels())
                .await;
            return;
        };
        let locale = session.locale();
        match session.stage_kind() {
            StageKind::AwaitingLanguage => {
                out.keyboard(locale, MessageKey::SelectLanguage, Locale::labels())
                    .await;
            }
            StageKind::CollectingImages => out.text(locale, MessageKey::AskImages).await,
            StageKind::AwaitingRenameDecision => {
                out.keyboard(locale, MessageKey::PdfReady, decision_choices())
                    .await;
            }
            StageKind::AwaitingNewName => out.text(locale, MessageKey::AskRename).await,
            StageKind::Done => {}
        }
    }
}

/// Send the artifact, delete it, and close the conversation.
async fn deliver(locale: Locale, artifact: StagedArtifact, out: &mut Replies<'_>) {
    let file_name = artifact.file_name().to_string();
    let sent = match artifact.read().await {
        Ok(bytes) => out
            .document(&file_name, bytes)
            .await
            .map_err(|e| FlowError::Delivery(e.to_string())),
        Err(e) => Err(FlowError::Delivery(e.to_string())),
    };
    artifact.discard().await;

    match sent {
        Ok(()) => info!(identity = %out.identity, file = %file_name, "document delivered"),
        Err(err) => {
            warn!(identity = %out.identity, error = %err, "delivery failed");
            out.text(locale, err.message_key()).await;
        }
    }
    out.text(locale, MessageKey::ThankYou).await;
}

async fn discard(session: Session) {
    if let Some(artifact) = session.into_artifact() {
        artifact.discard().await;
    }
}

fn decision_choices() -> Vec<String> {
    vec![Keyword::Yes.label().to_string(), Keyword::No.label().to_string()]
}

/// Reply sink for one event.
///
/// Text sends never abort a transition; the first failure is kept and
/// reported once the event is done.
struct Replies<'a> {
    transport: &'a dyn Transport,
    identity: &'a Identity,
    error: Option<ChannelError>,
}

impl<'a> Replies<'a> {
    const fn new(transport: &'a dyn Transport, identity: &'a Identity) -> Self {
        Self {
            transport,
            identity,
            error: None,
        }
    }

    async fn text(&mut self, locale: Locale, key: MessageKey) {
        let reply = OutboundReply::text(self.identity, locale, key);
        self.push(reply).await;
    }

    async fn keyboard(&mut self, locale: Locale, key: MessageKey, choices: Vec<String>) {
        let reply = OutboundReply::keyboard(self.identity, locale, key, choices);
        self.push(reply).await;
    }

    async fn document(&self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        let reply = OutboundReply::document(self.identity, file_name, bytes);
        self.transport.send(&reply).await?;
        Ok(())
    }

    async fn push(&mut self, reply: OutboundReply) {
        if let Err(e) = self.transport.send(&reply).await {
            warn!(identity = %self.identity, error = %e, "reply not delivered");
            self.error.get_or_insert(e);
        }
    }

    fn finish(self) -> Result<()> {
        self.error.map_or(Ok(()), |e| Err(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchResult};
    use crate::events::Reply;
    use crate::transport::RecordingTransport;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Serves `Locator::Bytes` as-is and fails every URL.
    struct MemoryStore;

    #[async_trait]
    impl ImageStore for MemoryStore {
        async fn fetch(&self, locator: &Locator) -> FetchResult<Vec<u8>> {
            match locator {
                Locator::Bytes(data) => Ok(data.to_vec()),
                _ => Err(FetchError::Status(404)),
            }
        }
    }

    fn png(width: u32, height: u32) -> Locator {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 9, 9])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        Locator::bytes(buf.into_inner())
    }

    fn engine(dir: &std::path::Path, max_images: usize) -> Conversation {
        Conversation::new(
            Arc::new(MemoryStore),
            ArtifactStore::new(dir),
            EngineSettings {
                max_images,
                ..EngineSettings::default()
            },
        )
    }

    async fn say(engine: &Conversation, t: &RecordingTransport, id: i64, text: &str) {
        engine
            .handle(InboundEvent::from_text(id, text), t)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_session_prompts_for_language() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 10);
        let t = RecordingTransport::new();
        let id = Identity::from(1);

        say(&engine, &t, 1, "hello").await;
        say(&engine, &t, 1, "yes").await;
        engine
            .handle(InboundEvent::image(1, png(2, 2)), &t)
            .await
            .unwrap();

        assert_eq!(
            t.keys_for(&id),
            vec![MessageKey::SelectLanguage; 3]
        );
        assert!(!engine.sessions().contains(&id).await);
        assert!(engine.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_finish_without_session_does_not_create_one() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 10);
        let t = RecordingTransport::new();
        let id = Identity::from(2);

        say(&engine, &t, 2, "Finish").await;
        assert_eq!(t.keys_for(&id), vec![MessageKey::NoImages]);
        assert!(!engine.sessions().contains(&id).await);
    }

    #[tokio::test]
    async fn test_restart_discards_pending_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 10);
        let t = RecordingTransport::new();
        let id = Identity::from(3);

        say(&engine, &t, 3, "Русский").await;
        engine
            .handle(InboundEvent::image(3, png(3, 3)), &t)
            .await
            .unwrap();
        say(&engine, &t, 3, "finish").await;
        let staged = dir.path().join("output_3.pdf");
        assert!(staged.exists());

        t.clear();
        say(&engine, &t, 3, "/start").await;
        assert!(!staged.exists());

        let replies = t.replies_for(&id);
        assert_eq!(replies.len(), 1);
        match &replies[0] {
            Reply::Keyboard { key, text, choices } => {
                assert_eq!(*key, MessageKey::Start);
                assert_eq!(text, Locale::Ru.text(MessageKey::Start));
                assert_eq!(choices, &Locale::labels());
            }
            other => panic!("unexpected {other:?}"),
        }

        let view = &engine.sessions().snapshot()[0];
        assert_eq!(view.stage, StageKind::AwaitingLanguage);
        assert_eq!(view.images, 0);
    }

    #[tokio::test]
    async fn test_image_limit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 2);
        let t = RecordingTransport::new();
        let id = Identity::from(4);

        say(&engine, &t, 4, "English").await;
        for _ in 0..3 {
            engine
                .handle(InboundEvent::image(4, png(2, 2)), &t)
                .await
                .unwrap();
        }
        assert_eq!(
            t.keys_for(&id),
            vec![
                MessageKey::AskImages,
                MessageKey::ImageReceived,
                MessageKey::ImageReceived,
                MessageKey::TooManyImages,
            ]
        );
        assert_eq!(engine.sessions().snapshot()[0].images, 2);
    }

    #[tokio::test]
    async fn test_reprompts_in_rename_stages() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 10);
        let t = RecordingTransport::new();
        let id = Identity::from(5);

        say(&engine, &t, 5, "English").await;
        engine
            .handle(InboundEvent::image(5, png(2, 2)), &t)
            .await
            .unwrap();
        say(&engine, &t, 5, "Finish").await;
        t.clear();

        say(&engine, &t, 5, "maybe").await;
        engine
            .handle(InboundEvent::image(5, png(2, 2)), &t)
            .await
            .unwrap();
        say(&engine, &t, 5, "Yes").await;
        engine
            .handle(InboundEvent::image(5, png(2, 2)), &t)
            .await
            .unwrap();

        assert_eq!(
            t.keys_for(&id),
            vec![
                MessageKey::PdfReady,
                MessageKey::PdfReady,
                MessageKey::AskRename,
                MessageKey::AskRename,
            ]
        );
    }

    #[tokio::test]
    async fn test_keyword_text_is_a_valid_name() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 10);
        let t = RecordingTransport::new();
        let id = Identity::from(6);

        say(&engine, &t, 6, "Polski").await;
        engine
            .handle(InboundEvent::image(6, png(2, 2)), &t)
            .await
            .unwrap();
        say(&engine, &t, 6, "Finish").await;
        say(&engine, &t, 6, "Yes").await;
        say(&engine, &t, 6, "English").await;

        let docs = t.documents_for(&id);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].0, "English.pdf");
        assert!(!dir.path().join("English.pdf").exists());
        assert!(!engine.sessions().contains(&id).await);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_batch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 10);
        let t = RecordingTransport::new();
        let id = Identity::from(7);

        say(&engine, &t, 7, "English").await;
        engine
            .handle(InboundEvent::image(7, png(2, 2)), &t)
            .await
            .unwrap();
        engine
            .handle(
                InboundEvent::image(7, Locator::Url("https://example.invalid/a.png".into())),
                &t,
            )
            .await
            .unwrap();
        t.clear();
        say(&engine, &t, 7, "Finish").await;

        assert_eq!(
            t.keys_for(&id),
            vec![MessageKey::Converting, MessageKey::FetchFailed]
        );
        let view = &engine.sessions().snapshot()[0];
        assert_eq!(view.stage, StageKind::CollectingImages);
        assert_eq!(view.images, 2);
    }
}
