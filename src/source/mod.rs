//! Remote repository access.
//!
//! The crawler only needs two operations from a repository host: list the
//! entries of one directory, and fetch the raw bytes behind a content
//! locator. [`RepositoryApi`] is the seam between the crawler and a host:
//! - [`GitHubApi`]: the GitHub contents API plus raw download URLs
//! - [`LocalRepository`]: a checkout on the local filesystem

mod github;
mod local;

pub use github::GitHubApi;
pub use local::LocalRepository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules and anything else the crawler skips.
    #[serde(other)]
    Other,
}

/// One entry of a directory listing, shaped like the GitHub contents API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub sha: String,
}

impl DirectoryEntry {
    pub fn file(path: &str, size: u64, download_url: &str, sha: &str) -> Self {
        Self {
            kind: EntryKind::File,
            name: entry_name(path).to_string(),
            path: path.to_string(),
            size,
            download_url: Some(download_url.to_string()),
            sha: sha.to_string(),
        }
    }

    pub fn dir(path: &str) -> Self {
        Self {
            kind: EntryKind::Dir,
            name: entry_name(path).to_string(),
            path: path.to_string(),
            size: 0,
            download_url: None,
            sha: String::new(),
        }
    }
}

fn entry_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A repository host the crawler can walk and download from.
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// List the direct children of `path` ("" is the repository root).
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, SourceError>;

    /// Fetch the raw bytes behind a content locator.
    async fn fetch_raw(&self, locator: &str) -> Result<Vec<u8>, SourceError>;

    /// Human readable location, used in logs and reports.
    fn describe(&self) -> String;

    /// Browser-facing raw URL for a path, when the host has one.
    fn raw_url(&self, _path: &str) -> Option<String> {
        None
    }
}
