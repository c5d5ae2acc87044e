//! Core types shared by the crawler components.

use serde::{Deserialize, Serialize};

/// One remote artifact discovered during a scan.
///
/// References are immutable. A re-scan that observes a different
/// `revision_id` produces a new reference rather than mutating the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileReference {
    pub name: String,
    /// Full repository-relative path, unique per scan.
    pub path: String,
    /// Size in bytes as reported by the listing (informational only).
    pub size: u64,
    /// Opaque fetch handle, usually the raw download URL.
    pub content_locator: String,
    /// Content hash of the file (the git blob sha).
    pub revision_id: String,
}

impl FileReference {
    /// Directory part of the path; empty for top-level files.
    pub fn directory(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }

    /// Size in kilobytes, for display.
    pub fn size_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }
}

/// Whether the fetched bytes decoded as a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ArtifactStatus {
    Valid,
    Invalid { error: String },
}

/// Raw bytes of a fetched artifact plus its parse status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub status: ArtifactStatus,
}

impl Artifact {
    /// Freshly fetched bytes that have not been parsed yet count as valid.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            status: ArtifactStatus::Valid,
        }
    }

    /// Mark the artifact as malformed.
    pub fn invalid(mut self, error: impl Into<String>) -> Self {
        self.status = ArtifactStatus::Invalid {
            error: error.into(),
        };
        self
    }

    pub fn is_valid(&self) -> bool {
        self.status == ArtifactStatus::Valid
    }

    /// Bytes as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}
