//! Single-artifact content retrieval.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{LoadError, SourceError};
use crate::model::{Artifact, FileReference};
use crate::source::RepositoryApi;

/// Default per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Downloads the raw bytes of one artifact.
///
/// One attempt per call; retry policy belongs to the caller. Bytes are
/// returned without being parsed, so malformed JSON is never a fetch error.
#[derive(Clone)]
pub struct ContentFetcher {
    api: Arc<dyn RepositoryApi>,
    timeout: Duration,
}

impl ContentFetcher {
    pub fn new(api: Arc<dyn RepositoryApi>) -> Self {
        Self {
            api,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch(&self, reference: &FileReference) -> Result<Artifact, LoadError> {
        let failed = |source| LoadError::FetchFailed {
            path: reference.path.clone(),
            source,
        };

        if reference.content_locator.is_empty() {
            return Err(failed(SourceError::NotFound(format!(
                "no content locator for {}",
                reference.path
            ))));
        }

        let bytes = tokio::time::timeout(self.timeout, self.api.fetch_raw(&reference.content_locator))
            .await
            .map_err(|_| failed(SourceError::Timeout))?
            .map_err(failed)?;

        Ok(Artifact::new(bytes))
    }
}
