//! Image store: resolves locators into raw image bytes.

use crate::config::FetchSettings;
use crate::error::{FetchError, FetchResult, FlowError, FlowResult};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque reference to image bytes.
#[derive(Clone)]
pub enum Locator {
    /// Remote file fetched over HTTP(S).
    Url(String),
    /// Local file.
    Path(PathBuf),
    /// Bytes already in memory.
    Bytes(Arc<[u8]>),
}

impl Locator {
    /// In-memory locator.
    pub fn bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(data.into())
    }
}

// URLs can embed bot tokens, so they are never printed.
impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(_) => f.write_str("Url(..)"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
        }
    }
}

/// Source of raw image bytes.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Fetch the bytes behind `locator`.
    async fn fetch(&self, locator: &Locator) -> FetchResult<Vec<u8>>;
}

/// Fetch every locator in order, stopping at the first failure.
///
/// Each fetch is bounded by `timeout`, whatever the store does internally.
///
/// # Errors
///
/// Returns [`FlowError::Fetch`] carrying the index of the failing locator.
pub async fn fetch_all(
    store: &dyn ImageStore,
    locators: &[Locator],
    timeout: Duration,
) -> FlowResult<Vec<Vec<u8>>> {
    let mut images = Vec::with_capacity(locators.len());
    for (index, locator) in locators.iter().enumerate() {
        let fetched = tokio::time::timeout(timeout, store.fetch(locator))
            .await
            .unwrap_or(Err(FetchError::Timeout(timeout)));
        match fetched {
            Ok(bytes) => images.push(bytes),
            Err(e) => {
                warn!(index, error = %e, "image fetch failed");
                return Err(FlowError::Fetch {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(images)
}

/// Image store backed by `reqwest` for URLs and `tokio::fs` for paths.
#[derive(Debug, Clone)]
pub struct HttpImageStore {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: u64,
}

impl HttpImageStore {
    /// Create a store with the given fetch settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: FetchSettings) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self::with_client(client, &settings))
    }

    /// Create a store around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, settings: &FetchSettings) -> Self {
        Self {
            client,
            timeout: settings.timeout(),
            max_bytes: settings.max_image_bytes,
        }
    }

    const fn check_size(&self, size: u64) -> FetchResult<()> {
        if size > self.max_bytes {
            return Err(FetchError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    async fn fetch_url(&self, url: &str) -> FetchResult<Vec<u8>> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut body = Vec::new();
        if let Some(len) = response.content_length() {
            self.check_size(len)?;
            body.reserve(usize::try_from(len).unwrap_or(0));
        }
        // The declared length is optional, so the limit is enforced per chunk.
        while let Some(chunk) = response.chunk().await? {
            self.check_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn fetch_path(&self, path: &std::path::Path) -> FetchResult<Vec<u8>> {
        let meta = tokio::fs::metadata(path).await?;
        self.check_size(meta.len())?;
        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn fetch(&self, locator: &Locator) -> FetchResult<Vec<u8>> {
        let bytes = match locator {
            Locator::Url(url) => tokio::time::timeout(self.timeout, self.fetch_url(url))
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))??,
            Locator::Path(path) => self.fetch_path(path).await?,
            Locator::Bytes(data) => {
                self.check_size(data.len() as u64)?;
                data.to_vec()
            }
        };
        debug!(?locator, size = bytes.len(), "image fetched");
        Ok(bytes)
    }
}
