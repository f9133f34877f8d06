//! Per-identity conversation record.

use crate::artifact::StagedArtifact;
use crate::events::Identity;
use crate::locale::Locale;
use crate::store::Locator;
use crate::util::timestamp_ms;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Position in the conversation.
///
/// The rename stages own the staged artifact, so leaving them without
/// handing the artifact on drops (and deletes) it.
#[derive(Debug, Default)]
pub enum Stage {
    /// Waiting for a language label.
    AwaitingLanguage,
    /// Accumulating images until "Finish".
    #[default]
    CollectingImages,
    /// Document assembled, waiting for Yes/No.
    AwaitingRenameDecision {
        /// The assembled document.
        artifact: StagedArtifact,
    },
    /// Waiting for the new file name.
    AwaitingNewName {
        /// The assembled document.
        artifact: StagedArtifact,
    },
    /// Terminal; the session is about to be destroyed.
    Done,
}

impl Stage {
    /// Discriminant without the payload.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        match self {
            Self::AwaitingLanguage => StageKind::AwaitingLanguage,
            Self::CollectingImages => StageKind::CollectingImages,
            Self::AwaitingRenameDecision { .. } => StageKind::AwaitingRenameDecision,
            Self::AwaitingNewName { .. } => StageKind::AwaitingNewName,
            Self::Done => StageKind::Done,
        }
    }

    /// The pending artifact, if this stage holds one.
    #[must_use]
    pub const fn artifact(&self) -> Option<&StagedArtifact> {
        match self {
            Self::AwaitingRenameDecision { artifact } | Self::AwaitingNewName { artifact } => {
                Some(artifact)
            }
            _ => None,
        }
    }

    /// Consume the stage, returning its artifact.
    #[must_use]
    pub fn into_artifact(self) -> Option<StagedArtifact> {
        match self {
            Self::AwaitingRenameDecision { artifact } | Self::AwaitingNewName { artifact } => {
                Some(artifact)
            }
            _ => None,
        }
    }
}

/// Stage discriminant, for logging and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// See [`Stage::AwaitingLanguage`].
    AwaitingLanguage,
    /// See [`Stage::CollectingImages`].
    CollectingImages,
    /// See [`Stage::AwaitingRenameDecision`].
    AwaitingRenameDecision,
    /// See [`Stage::AwaitingNewName`].
    AwaitingNewName,
    /// See [`Stage::Done`].
    Done,
}

impl StageKind {
    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingLanguage => "awaiting_language",
            Self::CollectingImages => "collecting_images",
            Self::AwaitingRenameDecision => "awaiting_rename_decision",
            Self::AwaitingNewName => "awaiting_new_name",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation in progress.
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    locale: Locale,
    stage: Stage,
    images: Vec<Locator>,
    created_at: u64,
    updated_at: u64,
    last_active: Instant,
}

impl Session {
    /// A session that has picked `locale` and is collecting images.
    #[must_use]
    pub fn new(identity: Identity, locale: Locale) -> Self {
        Self::with_stage(identity, locale, Stage::CollectingImages)
    }

    /// A session waiting for a language, remembering the previous one for prompts.
    #[must_use]
    pub fn awaiting_language(identity: Identity, locale: Locale) -> Self {
        Self::with_stage(identity, locale, Stage::AwaitingLanguage)
    }

    fn with_stage(identity: Identity, locale: Locale, stage: Stage) -> Self {
        let now = timestamp_ms();
        Self {
            identity,
            locale,
            stage,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
            last_active: Instant::now(),
        }
    }

    /// Owner.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Selected (or remembered) locale.
    #[must_use]
    pub const fn locale(&self) -> Locale {
        self.locale
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Current stage discriminant.
    #[must_use]
    pub const fn stage_kind(&self) -> StageKind {
        self.stage.kind()
    }

    /// Collected images in submission order.
    #[must_use]
    pub fn images(&self) -> &[Locator] {
        &self.images
    }

    /// Creation time, ms since the epoch.
    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last modification time, ms since the epoch.
    #[must_use]
    pub const fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Append an image and return the new batch size.
    pub fn push_image(&mut self, locator: Locator) -> usize {
        self.images.push(locator);
        self.touch();
        self.images.len()
    }

    /// Drop the image at `index`.
    pub fn remove_image(&mut self, index: usize) -> Option<Locator> {
        if index >= self.images.len() {
            return None;
        }
        self.touch();
        Some(self.images.remove(index))
    }

    /// Empty the batch.
    pub fn clear_images(&mut self) {
        self.images.clear();
        self.touch();
    }

    /// Replace the stage, returning the previous one.
    pub fn set_stage(&mut self, stage: Stage) -> Stage {
        self.touch();
        std::mem::replace(&mut self.stage, stage)
    }

    /// Move the stage out, leaving [`Stage::Done`] behind.
    pub fn take_stage(&mut self) -> Stage {
        self.set_stage(Stage::Done)
    }

    /// Record activity.
    pub fn touch(&mut self) {
        self.updated_at = timestamp_ms();
        self.last_active = Instant::now();
    }

    /// Time since the last activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// Whether the session saw no activity for at least `ttl`.
    #[must_use]
    pub fn is_idle(&self, ttl: Duration) -> bool {
        self.idle_for() >= ttl
    }

    /// Consume the session, returning its pending artifact.
    #[must_use]
    pub fn into_artifact(self) -> Option<StagedArtifact> {
        self.stage.into_artifact()
    }

    /// Serializable summary.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            identity: self.identity.clone(),
            locale: self.locale.code(),
            stage: self.stage_kind(),
            images: self.images.len(),
            artifact: self.stage.artifact().map(|a| a.file_name().to_string()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            idle_secs: self.idle_for().as_secs(),
        }
    }
}

/// Read-only summary of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Owner.
    pub identity: Identity,
    /// Locale code.
    pub locale: &'static str,
    /// Stage.
    pub stage: StageKind,
    /// Number of collected images.
    pub images: usize,
    /// File name of the pending artifact.
    pub artifact: Option<String>,
    /// Creation time, ms since the epoch.
    pub created_at: u64,
    /// Last modification time, ms since the epoch.
    pub updated_at: u64,
    /// Seconds since the last activity.
    pub idle_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_collects_images() {
        let session = Session::new(Identity::from(1), Locale::Ru);
        assert_eq!(session.stage_kind(), StageKind::CollectingImages);
        assert_eq!(session.locale(), Locale::Ru);
        assert!(session.images().is_empty());
    }

    #[test]
    fn test_images_keep_submission_order() {
        let mut session = Session::new(Identity::from(1), Locale::En);
        for i in 0..3u8 {
            session.push_image(Locator::bytes(vec![i]));
        }
        assert!(session.remove_image(1).is_some());
        assert!(session.remove_image(5).is_none());

        let firsts: Vec<u8> = session
            .images()
            .iter()
            .map(|l| match l {
                Locator::Bytes(b) => b[0],
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(firsts, vec![0, 2]);
    }

    #[test]
    fn test_take_stage_leaves_done() {
        let mut session = Session::awaiting_language(Identity::from(1), Locale::Pl);
        let previous = session.take_stage();
        assert_eq!(previous.kind(), StageKind::AwaitingLanguage);
        assert_eq!(session.stage_kind(), StageKind::Done);
    }

    #[test]
    fn test_view_serializes() {
        let mut session = Session::new(Identity::from(9), Locale::Uz);
        session.push_image(Locator::bytes(vec![1u8]));
        let json = serde_json::to_value(session.view()).unwrap();
        assert_eq!(json["identity"], "9");
        assert_eq!(json["locale"], "uz");
        assert_eq!(json["stage"], "collecting_images");
        assert_eq!(json["images"], 1);
        assert!(json["artifact"].is_null());
    }

    #[test]
    fn test_idle() {
        let session = Session::new(Identity::from(1), Locale::En);
        assert!(session.is_idle(Duration::ZERO));
        assert!(!session.is_idle(Duration::from_secs(3600)));
    }
}
