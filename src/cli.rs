//! Command-line interface for flowscan.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::CrawlerConfig;
use crate::loader::{LoadProgress, LoadReport};
use crate::manager::WorkflowManager;
use crate::model::FileReference;
use crate::query::{FilterCriteria, Page};
use crate::report::{
    self, JsonArtifact, JsonListing, JsonLoadReport, JsonReport, JsonScan,
    DEFAULT_TOP_NODE_TYPES,
};
use crate::source::LocalRepository;
use crate::tree;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Crawl a repository of automation workflows and analyze them.
///
/// Flowscan lists every workflow file in a GitHub repository (or a local
/// checkout), fetches them concurrently, and reports node counts, trigger
/// usage and the most common node types.
#[derive(Parser)]
#[command(name = "flowscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List workflow files without fetching them
    Scan(ScanArgs),
    /// Fetch and analyze every workflow file
    Load(LoadArgs),
    /// Show one page of workflows, optionally filtered
    #[command(visible_alias = "ls")]
    List(ListArgs),
    /// Print statistics over the whole repository
    Report(ReportArgs),
    /// Download workflows into a local directory
    Export(ExportArgs),
}

/// Options shared by every command that talks to a repository.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Repository owner
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch to read from
    #[arg(long)]
    pub branch: Option<String>,

    /// Read from a local checkout instead of GitHub
    #[arg(long, value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Directory to start scanning from
    #[arg(long)]
    pub root: Option<String>,

    /// File suffix of workflow files
    #[arg(long)]
    pub extension: Option<String>,

    /// Maximum number of concurrent fetches
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

/// Arguments for the scan command.
#[derive(Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for the load command.
#[derive(Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Attempts per file for retryable network errors
    #[arg(long)]
    pub retries: Option<u32>,
}

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Page number, starting at 1
    #[arg(short, long, default_value_t = 1)]
    pub page: usize,

    /// Workflows per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Fetch and analyze workflows before listing
    #[arg(short, long)]
    pub load: bool,
}

/// Filter options for the list command.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Match file name, path or workflow name
    #[arg(short, long)]
    pub search: Option<String>,

    /// Match the directory of the file
    #[arg(long)]
    pub folder: Option<String>,

    /// Minimum node count (loaded workflows only)
    #[arg(long)]
    pub min_nodes: Option<usize>,

    /// Maximum node count (loaded workflows only)
    #[arg(long)]
    pub max_nodes: Option<usize>,

    /// Match a node type (loaded workflows only)
    #[arg(long)]
    pub node_type: Option<String>,
}

impl From<&FilterArgs> for FilterCriteria {
    fn from(args: &FilterArgs) -> Self {
        Self {
            search_term: args.search.clone(),
            folder: args.folder.clone(),
            min_nodes: args.min_nodes,
            max_nodes: args.max_nodes,
            node_type_contains: args.node_type.clone(),
        }
    }
}

/// Arguments for the report command.
#[derive(Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Number of node types to show
    #[arg(long, default_value_t = DEFAULT_TOP_NODE_TYPES)]
    pub top: usize,
}

/// Arguments for the export command.
#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output directory
    #[arg(short, long)]
    pub out: PathBuf,
}

impl SourceArgs {
    fn is_json(&self) -> bool {
        self.format == "json"
    }

    /// Load the config file (explicit or discovered) and apply flag overrides.
    pub fn resolve_config(&self) -> anyhow::Result<CrawlerConfig> {
        let path = self.config.clone().or_else(CrawlerConfig::discover);
        let mut config = match &path {
            Some(p) => {
                debug!(path = %p.display(), "loading config");
                CrawlerConfig::parse_file(p)?
            }
            None => CrawlerConfig::default(),
        };

        if let Some(owner) = &self.owner {
            config.owner = owner.clone();
        }
        if let Some(repo) = &self.repo {
            config.repo = repo.clone();
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        config.validate()?;
        Ok(config)
    }

    fn manager(&self, config: CrawlerConfig) -> anyhow::Result<WorkflowManager> {
        match &self.local {
            Some(dir) => Ok(WorkflowManager::new(
                Arc::new(LocalRepository::new(dir)),
                config,
            )),
            None => Ok(WorkflowManager::github(config)?),
        }
    }
}

/// Validate the output format, printing an error when it is unknown.
fn check_format(format: &str) -> bool {
    if format != "pretty" && format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            format
        );
        return false;
    }
    true
}

/// Build a runtime that cancels `manager` on ctrl-c.
fn runtime_for(manager: &WorkflowManager) -> anyhow::Result<Runtime> {
    let runtime = Runtime::new()?;
    let token = manager.cancel_token();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling outstanding work");
            token.cancel();
        }
    });
    Ok(runtime)
}

fn progress_bar(total: usize, hidden: bool) -> ProgressBar {
    if hidden || total == 0 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("█▓▒░  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message("Loading workflows...");
    bar
}

/// Scan, then load everything with a progress bar on stderr.
fn scan_and_load(
    runtime: &Runtime,
    manager: &WorkflowManager,
    quiet: bool,
) -> anyhow::Result<(Vec<FileReference>, LoadReport)> {
    let refs = runtime.block_on(manager.scan())?;

    let bar = progress_bar(refs.len(), quiet);
    let load = runtime.block_on(manager.load_all(&refs, |p: &LoadProgress| {
        bar.set_position(p.completed as u64);
        bar.set_message(p.path.clone());
    }));
    bar.finish_and_clear();

    debug!(stats = ?manager.cache().stats(), "cache after load");
    Ok((refs, load))
}

fn load_exit_code(load: &LoadReport) -> i32 {
    if load.was_cancelled() {
        eprintln!("Interrupted: {} workflows not loaded", load.cancelled);
        EXIT_ERROR
    } else if !load.failed.is_empty() {
        EXIT_FAILED
    } else {
        EXIT_SUCCESS
    }
}

fn artifact_view(manager: &WorkflowManager, reference: &FileReference) -> JsonArtifact {
    let entry = manager.cache().peek_fresh(reference);
    JsonArtifact::new(reference, entry.as_deref(), manager.raw_url(&reference.path))
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    if !check_format(&args.source.format) {
        return Ok(EXIT_ERROR);
    }
    let config = args.source.resolve_config()?;
    let manager = args.source.manager(config)?;
    let runtime = runtime_for(&manager)?;

    let refs = runtime.block_on(manager.scan())?;
    let folders = tree::directory_summary(&refs);

    if args.source.is_json() {
        report::write_json(&JsonScan {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: manager.source(),
            total_files: refs.len(),
            folders,
            files: refs.iter().map(|r| artifact_view(&manager, r)).collect(),
        })?;
    } else {
        report::write_scan_pretty(&manager.source(), &refs, &folders);
    }

    Ok(EXIT_SUCCESS)
}

/// Run the load command.
pub fn run_load(args: &LoadArgs) -> anyhow::Result<i32> {
    if !check_format(&args.source.format) {
        return Ok(EXIT_ERROR);
    }
    let mut config = args.source.resolve_config()?;
    if let Some(retries) = args.retries {
        config.retry.max_attempts = retries.max(1);
    }
    let manager = args.source.manager(config)?;
    let runtime = runtime_for(&manager)?;

    let (refs, load) = scan_and_load(&runtime, &manager, args.source.is_json())?;

    if args.source.is_json() {
        report::write_json(&JsonLoadReport::from(&load))?;
    } else {
        report::write_scan_pretty(&manager.source(), &refs, &tree::directory_summary(&refs));
        report::write_load_summary(&load);
    }

    Ok(load_exit_code(&load))
}

/// Run the list command.
pub fn run_list(args: &ListArgs) -> anyhow::Result<i32> {
    if !check_format(&args.source.format) {
        return Ok(EXIT_ERROR);
    }
    let mut config = args.source.resolve_config()?;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size.max(1);
    }
    let manager = args.source.manager(config)?;
    let runtime = runtime_for(&manager)?;

    let refs = if args.load {
        let (refs, load) = scan_and_load(&runtime, &manager, args.source.is_json())?;
        if !load.is_success() {
            warn!(
                failed = load.failed.len(),
                cancelled = load.cancelled,
                "some workflows could not be loaded"
            );
        }
        refs
    } else {
        runtime.block_on(manager.scan())?
    };

    let criteria = FilterCriteria::from(&args.filter);
    let page = manager.page(&refs, &criteria, args.page.saturating_sub(1));
    let view = Page {
        items: page.items.iter().map(|r| artifact_view(&manager, r)).collect(),
        page_index: page.page_index,
        page_size: page.page_size,
        total_items: page.total_items,
        total_pages: page.total_pages,
    };

    if args.source.is_json() {
        report::write_json(&JsonListing {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: manager.source(),
            total_files: refs.len(),
            matching_files: view.total_items,
            page: view.page_index + 1,
            page_size: view.page_size,
            total_pages: view.total_pages,
            items: view.items,
        })?;
    } else {
        report::write_page_pretty(&manager.source(), &view, refs.len());
    }

    Ok(EXIT_SUCCESS)
}

/// Run the report command.
pub fn run_report(args: &ReportArgs) -> anyhow::Result<i32> {
    if !check_format(&args.source.format) {
        return Ok(EXIT_ERROR);
    }
    let config = args.source.resolve_config()?;
    let manager = args.source.manager(config)?;
    let runtime = runtime_for(&manager)?;

    let (refs, load) = scan_and_load(&runtime, &manager, args.source.is_json())?;
    let stats = manager.report(&refs);

    if args.source.is_json() {
        report::write_json(&JsonReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: manager.source(),
            files_scanned: refs.len(),
            load: JsonLoadReport::from(&load),
            report: &stats,
        })?;
    } else {
        report::write_report_pretty(&manager.source(), &stats, args.top);
        report::write_load_summary(&load);
    }

    if load.was_cancelled() {
        return Ok(EXIT_ERROR);
    }
    Ok(EXIT_SUCCESS)
}

/// Run the export command.
pub fn run_export(args: &ExportArgs) -> anyhow::Result<i32> {
    if !check_format(&args.source.format) {
        return Ok(EXIT_ERROR);
    }
    let config = args.source.resolve_config()?;
    let manager = args.source.manager(config)?;
    let runtime = runtime_for(&manager)?;

    let (refs, load) = scan_and_load(&runtime, &manager, args.source.is_json())?;
    let written = manager.export(&refs, &args.out)?;

    if args.source.is_json() {
        report::write_json(&JsonLoadReport::from(&load))?;
    } else {
        report::write_load_summary(&load);
        println!(
            "  Exported {} workflows to {}",
            written,
            args.out.display()
        );
        println!();
    }

    Ok(load_exit_code(&load))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_args() {
        let cli = Cli::try_parse_from([
            "flowscan",
            "list",
            "--owner",
            "acme",
            "--search",
            "invoice",
            "--min-nodes",
            "5",
            "--page",
            "2",
            "--load",
        ])
        .unwrap();

        let Commands::List(args) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(args.source.owner.as_deref(), Some("acme"));
        assert_eq!(args.page, 2);
        assert!(args.load);

        let criteria = FilterCriteria::from(&args.filter);
        assert_eq!(criteria.search_term.as_deref(), Some("invoice"));
        assert_eq!(criteria.min_nodes, Some(5));
        assert_eq!(criteria.max_nodes, None);
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["flowscan", "scan", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_resolve_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowscan.yaml");
        std::fs::write(&path, "owner: someone\nconcurrency: 3\n").unwrap();

        let args = SourceArgs {
            config: Some(path),
            repo: Some("flows".to_string()),
            concurrency: Some(8),
            format: "pretty".to_string(),
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.owner, "someone");
        assert_eq!(config.repo, "flows");
        assert_eq!(config.concurrency, 8);
    }

    #[test]
    fn test_resolve_config_rejects_invalid_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowscan.yaml");
        std::fs::write(&path, "").unwrap();

        let args = SourceArgs {
            config: Some(path),
            concurrency: Some(0),
            ..Default::default()
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_check_format() {
        assert!(check_format("pretty"));
        assert!(check_format("json"));
        assert!(!check_format("sarif"));
    }

    #[test]
    fn test_load_exit_code() {
        let mut load = LoadReport {
            total: 1,
            succeeded: 1,
            ..Default::default()
        };
        assert_eq!(load_exit_code(&load), EXIT_SUCCESS);
        load.cancelled = 1;
        assert_eq!(load_exit_code(&load), EXIT_ERROR);
    }
}
