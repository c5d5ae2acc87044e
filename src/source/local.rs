//! Filesystem-backed repository for local checkouts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{DirectoryEntry, EntryKind, RepositoryApi};
use crate::error::SourceError;

/// A repository checked out on the local filesystem.
///
/// Content locators are absolute file paths. Revision ids are derived from
/// size and modification time, which is enough to notice edits between scans.
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

#[async_trait]
impl RepositoryApi for LocalRepository {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, SourceError> {
        let dir = self.resolve(path);
        let mut reader = tokio::fs::read_dir(&dir).await?;
        let mut entries = Vec::new();

        while let Some(item) = reader.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            let metadata = item.metadata().await?;
            let rel_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", path.trim_end_matches('/'), name)
            };

            let kind = if metadata.is_dir() {
                EntryKind::Dir
            } else if metadata.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };

            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);

            entries.push(DirectoryEntry {
                kind,
                name,
                path: rel_path,
                size: metadata.len(),
                download_url: (kind == EntryKind::File)
                    .then(|| item.path().to_string_lossy().to_string()),
                sha: format!("{:x}-{:x}", metadata.len(), modified),
            });
        }

        // read_dir order is platform dependent
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch_raw(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        let bytes = tokio::fs::read(locator).await?;
        Ok(bytes)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
