//! Artifact staging, renaming and cleanup.
//!
//! An assembled document is written to the staging directory and represented
//! by a [`StagedArtifact`] guard. The guard removes its file when dropped, so
//! every path that abandons a pending document (delivery, failure, restart,
//! eviction) also cleans it up.

use crate::error::{ArtifactError, ArtifactResult, NameIssue};
use crate::events::Identity;
use crate::util::sanitize_file_stem;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of every artifact.
pub const EXTENSION: &str = "pdf";

/// Prefix of every default artifact name. Rename targets may not use it.
pub const DEFAULT_PREFIX: &str = "output_";

/// Longest accepted rename target, in characters.
pub const MAX_NAME_LEN: usize = 100;

const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Owns the staging directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`. The directory is created on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Staging directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Default file name for an identity's artifact.
    #[must_use]
    pub fn default_file_name(identity: &Identity) -> String {
        format!(
            "{DEFAULT_PREFIX}{}.{EXTENSION}",
            sanitize_file_stem(identity.as_str())
        )
    }

    /// Write `bytes` under the identity's default name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the file cannot be written.
    pub async fn stage(&self, identity: &Identity, bytes: &[u8]) -> ArtifactResult<StagedArtifact> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = Self::default_file_name(identity);
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(%identity, path = %path.display(), size = bytes.len(), "artifact staged");
        Ok(StagedArtifact::new(path, file_name))
    }

    /// Whether an artifact named `<name>.pdf` exists.
    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.dir.join(format!("{name}.{EXTENSION}")))
            .await
            .unwrap_or(false)
    }

    /// Move `artifact` to `<candidate>.pdf`.
    ///
    /// The target is never overwritten. On rejection the untouched artifact
    /// is handed back together with the reason.
    ///
    /// # Errors
    ///
    /// Returns [`RenameRejected`] for an invalid or colliding name, or when
    /// the file system refuses the move.
    pub async fn rename(
        &self,
        artifact: StagedArtifact,
        candidate: &str,
    ) -> Result<StagedArtifact, RenameRejected> {
        let name = match validate_name(candidate) {
            Ok(name) => name,
            Err(issue) => return Err(RenameRejected::name(artifact, issue)),
        };
        let file_name = format!("{name}.{EXTENSION}");
        let target = self.dir.join(&file_name);

        // A hard link fails atomically when the target exists, so two
        // identities can never claim the same name.
        match tokio::fs::hard_link(artifact.path(), &target).await {
            Ok(()) => {
                artifact.discard().await;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RenameRejected::name(artifact, NameIssue::Exists(name)));
            }
            Err(e) => {
                debug!(error = %e, "hard link unavailable, falling back to rename");
                if tokio::fs::try_exists(&target).await.unwrap_or(true) {
                    return Err(RenameRejected::name(artifact, NameIssue::Exists(name)));
                }
                if let Err(e) = tokio::fs::rename(artifact.path(), &target).await {
                    return Err(RenameRejected {
                        artifact,
                        error: ArtifactError::Io(e),
                    });
                }
                artifact.disarm();
            }
        }

        debug!(target = %target.display(), "artifact renamed");
        Ok(StagedArtifact::new(target, file_name))
    }
}

/// A rename that did not happen.
#[derive(Debug)]
pub struct RenameRejected {
    /// The artifact, still staged under its previous name.
    pub artifact: StagedArtifact,
    /// Why the rename was refused.
    pub error: ArtifactError,
}

impl RenameRejected {
    const fn name(artifact: StagedArtifact, issue: NameIssue) -> Self {
        Self {
            artifact,
            error: ArtifactError::Name(issue),
        }
    }
}

/// Validate a rename candidate and return the normalized stem.
///
/// Trims whitespace and drops a trailing `.pdf`. Names in the default
/// namespace are refused, since another identity may stage that file at
/// any moment.
///
/// # Errors
///
/// Returns the [`NameIssue`] that makes the candidate unusable.
pub fn validate_name(candidate: &str) -> Result<String, NameIssue> {
    let mut name = candidate.trim();
    let suffix = format!(".{EXTENSION}");
    if let Some(tail) = name.len().checked_sub(suffix.len()).and_then(|i| name.get(i..)) {
        if tail.eq_ignore_ascii_case(&suffix) {
            name = name[..name.len() - suffix.len()].trim_end();
        }
    }

    if name.is_empty() {
        return Err(NameIssue::Empty);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(NameIssue::TooLong(MAX_NAME_LEN));
    }
    let is_default_name = name
        .get(..DEFAULT_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DEFAULT_PREFIX));
    let has_reserved_char = name
        .chars()
        .any(|c| c.is_control() || RESERVED_CHARS.contains(&c));
    if is_default_name || has_reserved_char || name.starts_with('.') {
        return Err(NameIssue::Reserved);
    }
    Ok(name.to_string())
}

/// A staged document file, removed when the guard goes away.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
    file_name: String,
    armed: bool,
}

impl StagedArtifact {
    const fn new(path: PathBuf, file_name: String) -> Self {
        Self {
            path,
            file_name,
            armed: true,
        }
    }

    /// Location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for delivery.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Read the document bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read(&self) -> ArtifactResult<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    /// Delete the file now.
    pub async fn discard(mut self) {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "artifact removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove artifact"),
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "artifact removed on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove artifact"),
        }
    }
}
