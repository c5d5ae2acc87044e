//! Error types for scanning and loading.
//!
//! Scan errors abort a whole repository walk. Load errors are recorded per
//! artifact in a [`LoadReport`](crate::loader::LoadReport) and never abort a
//! batch.

use thiserror::Error;

/// Errors raised while talking to the remote repository.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by remote")]
    RateLimited,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid directory listing: {0}")]
    InvalidListing(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether a retry policy may re-attempt the request.
    ///
    /// Timeouts and client errors are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(e) => !e.is_timeout(),
            SourceError::Status(code) => *code >= 500,
            SourceError::RateLimited => true,
            SourceError::Timeout
            | SourceError::Io(_)
            | SourceError::NotFound(_)
            | SourceError::InvalidListing(_)
            | SourceError::InvalidUrl(_) => false,
        }
    }
}

/// Errors that abort a repository scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan failed at {path:?}: {source}")]
    Failed {
        path: String,
        #[source]
        source: SourceError,
    },
    #[error("directory depth exceeded {max_depth} at {path:?}")]
    DepthExceeded { path: String, max_depth: usize },
    #[error("scan cancelled")]
    Cancelled,
}

/// Per-artifact failures recorded by a batch load.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("fetch failed for {path}: {source}")]
    FetchFailed {
        path: String,
        #[source]
        source: SourceError,
    },
    #[error("parse error in {path}: {message}")]
    ParseError { path: String, message: String },
    #[error("load of {path} cancelled")]
    Cancelled { path: String },
}

impl LoadError {
    /// Path of the artifact this error belongs to.
    pub fn path(&self) -> &str {
        match self {
            LoadError::FetchFailed { path, .. }
            | LoadError::ParseError { path, .. }
            | LoadError::Cancelled { path } => path,
        }
    }

    /// Short stable name of the failure stage.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::FetchFailed { .. } => "fetch_failed",
            LoadError::ParseError { .. } => "parse_error",
            LoadError::Cancelled { .. } => "cancelled",
        }
    }
}
