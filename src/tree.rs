//! Recursive artifact discovery over a repository tree.

use futures::future::{BoxFuture, FutureExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::ScanError;
use crate::model::FileReference;
use crate::source::{DirectoryEntry, EntryKind, RepositoryApi};

/// Default bound on directory nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Directory label used for top-level files in summaries.
pub const ROOT_LABEL: &str = "Root";

/// Walks a repository and collects references to matching files.
pub struct RepositoryTree {
    api: Arc<dyn RepositoryApi>,
    max_depth: usize,
    cancel: CancellationToken,
}

impl RepositoryTree {
    pub fn new(api: Arc<dyn RepositoryApi>) -> Self {
        Self {
            api,
            max_depth: DEFAULT_MAX_DEPTH,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the maximum directory nesting followed below the scan root.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Abort the walk when this token is cancelled.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// List every file under `root` whose name ends with `extension`.
    ///
    /// Results are sorted case-insensitively by file name; files sharing a
    /// name keep depth-first listing order. Any failed listing aborts the
    /// scan, an incomplete tree is never returned.
    #[instrument(skip(self), fields(source = %self.api.describe()))]
    pub async fn list_artifacts(
        &self,
        root: &str,
        extension: &str,
    ) -> Result<Vec<FileReference>, ScanError> {
        let mut walker = Walk {
            extension,
            seen: HashSet::new(),
            found: Vec::new(),
        };
        self.walk(root.trim_matches('/'), 0, &mut walker).await?;

        let mut refs = walker.found;
        refs.sort_by_cached_key(|r| r.name.to_lowercase());

        info!(count = refs.len(), "scan complete");
        Ok(refs)
    }

    fn walk<'a, 'e: 'a>(
        &'a self,
        path: &'a str,
        depth: usize,
        walker: &'a mut Walk<'e>,
    ) -> BoxFuture<'a, Result<(), ScanError>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            if depth > self.max_depth {
                return Err(ScanError::DepthExceeded {
                    path: path.to_string(),
                    max_depth: self.max_depth,
                });
            }

            let entries = self
                .api
                .list_directory(path)
                .await
                .map_err(|source| ScanError::Failed {
                    path: path.to_string(),
                    source,
                })?;
            debug!(path, depth, entries = entries.len(), "listed directory");

            for entry in entries {
                match entry.kind {
                    EntryKind::File => walker.accept(entry),
                    EntryKind::Dir => self.walk(&entry.path, depth + 1, walker).await?,
                    EntryKind::Other => {}
                }
            }
            Ok(())
        }
        .boxed()
    }
}

/// Accumulator for one scan.
struct Walk<'e> {
    extension: &'e str,
    seen: HashSet<String>,
    found: Vec<FileReference>,
}

impl Walk<'_> {
    fn accept(&mut self, entry: DirectoryEntry) {
        if !entry.name.ends_with(self.extension) {
            return;
        }
        if !self.seen.insert(entry.path.clone()) {
            return;
        }
        self.found.push(FileReference {
            name: entry.name,
            path: entry.path,
            size: entry.size,
            content_locator: entry.download_url.unwrap_or_default(),
            revision_id: entry.sha,
        });
    }
}

/// Count artifacts per parent directory, sorted by directory name.
pub fn directory_summary(refs: &[FileReference]) -> BTreeMap<String, usize> {
    let mut folders = BTreeMap::new();
    for r in refs {
        let dir = match r.directory() {
            "" => ROOT_LABEL,
            d => d,
        };
        *folders.entry(dir.to_string()).or_insert(0) += 1;
    }
    folders
}
