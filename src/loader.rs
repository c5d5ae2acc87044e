//! Bounded-concurrency batch loading.
//!
//! Each unit of work is fetch, then analyze, then store in the cache. A
//! failing unit is recorded in the [`LoadReport`] and never stops its
//! siblings.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::analyze;
use crate::cache::ArtifactCache;
use crate::config::RetryConfig;
use crate::error::LoadError;
use crate::fetch::ContentFetcher;
use crate::model::{Artifact, FileReference};

/// Default number of fetches in flight.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Fixed retry policy applied to every fetch in a batch.
///
/// Only retryable source errors are re-attempted; timeouts and client
/// errors fail on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay, multiplied by the attempt number
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Snapshot handed to the progress callback after each unit completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProgress {
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Path of the unit that just finished
    pub path: String,
    pub ok: bool,
}

impl LoadProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Outcome of a batch load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub total: usize,
    pub succeeded: usize,
    /// Failed units with their cause, in completion order
    pub failed: Vec<(String, LoadError)>,
    /// Units skipped or discarded because the batch was cancelled
    pub cancelled: usize,
}

impl LoadReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }

    pub fn failed_paths(&self) -> Vec<&str> {
        self.failed.iter().map(|(path, _)| path.as_str()).collect()
    }
}

/// Loads batches of artifacts into a shared cache.
pub struct ConcurrentLoader {
    fetcher: ContentFetcher,
    cache: Arc<ArtifactCache>,
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ConcurrentLoader {
    pub fn new(fetcher: ContentFetcher, cache: Arc<ArtifactCache>) -> Self {
        Self {
            fetcher,
            cache,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the maximum number of units in flight (at least 1).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop dispatching new units once this token is cancelled.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load every reference, without progress reporting.
    pub async fn load_all(&self, refs: &[FileReference]) -> LoadReport {
        self.load_all_with_progress(refs, |_| {}).await
    }

    /// Load every reference, calling `on_progress` after each unit.
    ///
    /// Completion order is unspecified.
    #[instrument(skip_all, fields(total = refs.len(), concurrency = self.concurrency))]
    pub async fn load_all_with_progress<F>(
        &self,
        refs: &[FileReference],
        mut on_progress: F,
    ) -> LoadReport
    where
        F: FnMut(&LoadProgress),
    {
        let mut report = LoadReport {
            total: refs.len(),
            ..Default::default()
        };
        let mut completed = 0;

        let mut units = stream::iter(refs.iter().cloned())
            .map(|reference| self.load_one(reference))
            .buffer_unordered(self.concurrency);

        while let Some((path, result)) = units.next().await {
            completed += 1;
            let ok = result.is_ok();
            match result {
                Ok(()) => report.succeeded += 1,
                Err(LoadError::Cancelled { .. }) => report.cancelled += 1,
                Err(err) => {
                    warn!(path = %path, error = %err, "artifact failed to load");
                    report.failed.push((path.clone(), err));
                }
            }

            on_progress(&LoadProgress {
                completed,
                total: report.total,
                succeeded: report.succeeded,
                failed: report.failed.len(),
                path,
                ok,
            });
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "batch load complete"
        );
        report
    }

    async fn load_one(&self, reference: FileReference) -> (String, Result<(), LoadError>) {
        let path = reference.path.clone();
        let result = self.fetch_analyze_store(reference).await;
        (path, result)
    }

    async fn fetch_analyze_store(&self, reference: FileReference) -> Result<(), LoadError> {
        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled {
                path: reference.path,
            });
        }

        let artifact = self.fetch_with_retry(&reference).await?;
        let analysis = analyze::analyze(&artifact.bytes);

        // Results of fetches still in flight at cancellation are dropped
        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled {
                path: reference.path,
            });
        }

        match analysis {
            Ok(analysis) => {
                debug!(path = %reference.path, nodes = analysis.node_count, "artifact loaded");
                self.cache.put(reference, artifact, Some(analysis));
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                let path = reference.path.clone();
                // Keep the bytes so the malformed content can be inspected
                self.cache.put(reference, artifact.invalid(message.clone()), None);
                Err(LoadError::ParseError { path, message })
            }
        }
    }

    async fn fetch_with_retry(&self, reference: &FileReference) -> Result<Artifact, LoadError> {
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(reference).await {
                Ok(artifact) => return Ok(artifact),
                Err(err) if self.should_retry(&err, attempt) => {
                    debug!(path = %reference.path, attempt, error = %err, "retrying fetch");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn should_retry(&self, err: &LoadError, attempt: u32) -> bool {
        if attempt >= self.retry.max_attempts || self.cancel.is_cancelled() {
            return false;
        }
        matches!(err, LoadError::FetchFailed { source, .. } if source.is_retryable())
    }
}
