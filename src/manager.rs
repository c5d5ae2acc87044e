//! High-level crawler facade.
//!
//! `WorkflowManager` wires the components together for one repository:
//! scan with [`RepositoryTree`], load with [`ConcurrentLoader`], then query
//! and report over the shared [`ArtifactCache`]. The cache is owned here and
//! injected into the loader; there is no global state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analyze::AnalysisResult;
use crate::cache::ArtifactCache;
use crate::config::CrawlerConfig;
use crate::error::{ScanError, SourceError};
use crate::fetch::ContentFetcher;
use crate::loader::{ConcurrentLoader, LoadProgress, LoadReport, RetryPolicy};
use crate::model::FileReference;
use crate::query::{self, FilterCriteria, Page};
use crate::report::{self, Report};
use crate::source::{GitHubApi, RepositoryApi};
use crate::tree::RepositoryTree;

pub struct WorkflowManager {
    api: Arc<dyn RepositoryApi>,
    cache: Arc<ArtifactCache>,
    config: CrawlerConfig,
    /// Shared by operations started since the last `cancel()`
    token: Mutex<CancellationToken>,
}

impl WorkflowManager {
    /// Create a manager with a fresh cache sized by `config.cache_ttl_secs`.
    pub fn new(api: Arc<dyn RepositoryApi>, config: CrawlerConfig) -> Self {
        let cache = Arc::new(ArtifactCache::new(config.cache_ttl()));
        Self::with_cache(api, config, cache)
    }

    /// Create a manager around an existing cache.
    pub fn with_cache(
        api: Arc<dyn RepositoryApi>,
        config: CrawlerConfig,
        cache: Arc<ArtifactCache>,
    ) -> Self {
        Self {
            api,
            cache,
            config,
            token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Create a manager for the GitHub repository named in `config`.
    pub fn github(config: CrawlerConfig) -> Result<Self, SourceError> {
        let api = GitHubApi::new(&config)?;
        Ok(Self::new(Arc::new(api), config))
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn source(&self) -> String {
        self.api.describe()
    }

    /// Token of the current cancellation scope.
    ///
    /// Cancelling it aborts running scans and loads, and every later one
    /// until [`cancel`](Self::cancel) opens a new scope.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Abort running scans and loads. Operations started afterwards run
    /// under a fresh token.
    pub fn cancel(&self) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        debug!("cancelled running operations");
    }

    /// List all artifacts under the configured root.
    pub async fn scan(&self) -> Result<Vec<FileReference>, ScanError> {
        RepositoryTree::new(Arc::clone(&self.api))
            .max_depth(self.config.max_depth)
            .with_cancel(self.cancel_token())
            .list_artifacts(&self.config.root, &self.config.extension)
            .await
    }

    fn loader(&self) -> ConcurrentLoader {
        let fetcher =
            ContentFetcher::new(Arc::clone(&self.api)).timeout(self.config.fetch_timeout());
        ConcurrentLoader::new(fetcher, Arc::clone(&self.cache))
            .concurrency(self.config.concurrency)
            .retry(RetryPolicy::from(&self.config.retry))
            .with_cancel(self.cancel_token())
    }

    /// Fetch and analyze every reference, replacing cached entries.
    pub async fn load_all<F>(&self, refs: &[FileReference], on_progress: F) -> LoadReport
    where
        F: FnMut(&LoadProgress),
    {
        self.loader().load_all_with_progress(refs, on_progress).await
    }

    /// Load only references without a fresh entry for their revision.
    pub async fn load_missing<F>(&self, refs: &[FileReference], on_progress: F) -> LoadReport
    where
        F: FnMut(&LoadProgress),
    {
        let missing: Vec<FileReference> = refs
            .iter()
            .filter(|r| self.cache.get_fresh(r).is_none())
            .cloned()
            .collect();
        debug!(
            requested = refs.len(),
            missing = missing.len(),
            "loading missing artifacts"
        );
        self.loader().load_all_with_progress(&missing, on_progress).await
    }

    pub fn filter(&self, refs: &[FileReference], criteria: &FilterCriteria) -> Vec<FileReference> {
        query::filter(refs, &self.cache, criteria)
    }

    /// Filter, then return page `page_index` using the configured page size.
    pub fn page(
        &self,
        refs: &[FileReference],
        criteria: &FilterCriteria,
        page_index: usize,
    ) -> Page<FileReference> {
        let filtered = self.filter(refs, criteria);
        query::paginate(&filtered, self.config.page_size, page_index)
    }

    /// Analyses of loaded references, in listing order.
    pub fn loaded_analyses(&self, refs: &[FileReference]) -> Vec<AnalysisResult> {
        refs.iter()
            .filter_map(|r| self.cache.peek_fresh(r))
            .filter_map(|entry| entry.analysis.clone())
            .collect()
    }

    /// Statistics over the loaded subset of `refs`.
    pub fn report(&self, refs: &[FileReference]) -> Report {
        report::aggregate(&self.loaded_analyses(refs))
    }

    /// Forget one loaded artifact.
    pub fn remove(&self, path: &str) -> bool {
        self.cache.invalidate(path)
    }

    /// Forget every loaded artifact.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn raw_url(&self, path: &str) -> Option<String> {
        self.api.raw_url(path)
    }

    /// Write each loaded artifact under `out_dir`, mirroring repository paths.
    ///
    /// Valid workflows are pretty-printed; malformed ones are written as
    /// fetched. Returns the number of files written.
    pub fn export(&self, refs: &[FileReference], out_dir: &Path) -> io::Result<usize> {
        let mut written = 0;
        for reference in refs {
            let Some(entry) = self.cache.peek_fresh(reference) else {
                continue;
            };
            let Some(target) = export_path(out_dir, &reference.path) else {
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let pretty = if entry.artifact.is_valid() {
                serde_json::from_slice::<serde_json::Value>(&entry.artifact.bytes)
                    .ok()
                    .and_then(|v| serde_json::to_vec_pretty(&v).ok())
            } else {
                None
            };
            let bytes = pretty.as_deref().unwrap_or(&entry.artifact.bytes);
            fs::write(&target, bytes)?;
            written += 1;
        }
        info!(written, dir = %out_dir.display(), "export complete");
        Ok(written)
    }
}

/// Map a repository path below `out_dir`, refusing anything that escapes it.
fn export_path(out_dir: &Path, repo_path: &str) -> Option<PathBuf> {
    let mut target = out_dir.to_path_buf();
    let mut pushed = false;
    for segment in repo_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s => {
                target.push(s);
                pushed = true;
            }
        }
    }
    pushed.then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_path() {
        let base = Path::new("/out");
        assert_eq!(
            export_path(base, "flows/a.json"),
            Some(PathBuf::from("/out/flows/a.json"))
        );
        assert_eq!(
            export_path(base, "/flows//a.json"),
            Some(PathBuf::from("/out/flows/a.json"))
        );
        assert_eq!(export_path(base, "../etc/passwd"), None);
        assert_eq!(export_path(base, ""), None);
    }
}
