//! Flowscan - crawler and analyzer for repositories of automation workflows.
//!
//! Flowscan walks a repository (GitHub contents API or a local checkout),
//! collects every workflow file, fetches them with bounded concurrency and
//! extracts structural facts: node counts, connections, node types and
//! whether the workflow has a trigger.
//!
//! # Architecture
//!
//! - `source`: the `RepositoryApi` seam with GitHub and filesystem backends
//! - `tree`: recursive listing of artifacts under a root directory
//! - `fetch`: content retrieval with a per-request timeout
//! - `analyze`: permissive workflow decoding and structural analysis
//! - `cache`: TTL cache of fetched artifacts and their analyses
//! - `loader`: concurrent fetch-analyze-store batches
//! - `query`: filtering and pagination over scanned references
//! - `report`: corpus statistics and output formatting (text, JSON)
//! - `manager`: facade tying the above together
//! - `config`: YAML configuration with defaults

pub mod analyze;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod manager;
pub mod model;
pub mod query;
pub mod report;
pub mod source;
pub mod tree;

pub use analyze::{analyze, parse_workflow, AnalysisResult, Node, WorkflowGraph};
pub use cache::{ArtifactCache, CacheEntry, CacheStats};
pub use config::{CrawlerConfig, RetryConfig};
pub use error::{LoadError, ScanError, SourceError};
pub use fetch::ContentFetcher;
pub use loader::{ConcurrentLoader, LoadProgress, LoadReport, RetryPolicy};
pub use manager::WorkflowManager;
pub use model::{Artifact, ArtifactStatus, FileReference};
pub use query::{filter, paginate, FilterCriteria, Page};
pub use report::{aggregate, Report};
pub use source::{DirectoryEntry, EntryKind, GitHubApi, LocalRepository, RepositoryApi};
pub use tree::{directory_summary, RepositoryTree};
