//! Corpus statistics and output formatting.
//!
//! Aggregation works on whatever analyses the caller hands in, usually the
//! loaded subset of a scan. Output supports two formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::analyze::AnalysisResult;
use crate::cache::CacheEntry;
use crate::loader::LoadReport;
use crate::model::{ArtifactStatus, FileReference};
use crate::query::Page;

/// Node types shown by the pretty report.
pub const DEFAULT_TOP_NODE_TYPES: usize = 10;

/// How many artifacts use a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeTypeCount {
    pub node_type: String,
    pub count: usize,
}

/// Statistics over a set of loaded analyses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_artifacts: usize,
    pub total_nodes: usize,
    pub average_nodes: f64,
    pub min_nodes: Option<usize>,
    pub max_nodes: Option<usize>,
    /// Upper median for even counts
    pub median_nodes: Option<usize>,
    pub with_trigger: usize,
    /// Sorted by count descending, ties in first-seen order
    pub node_types: Vec<NodeTypeCount>,
}

impl Report {
    pub fn top_node_types(&self, n: usize) -> &[NodeTypeCount] {
        &self.node_types[..n.min(self.node_types.len())]
    }
}

/// Aggregate statistics over `analyses`.
pub fn aggregate<'a, I>(analyses: I) -> Report
where
    I: IntoIterator<Item = &'a AnalysisResult>,
{
    let mut node_counts = Vec::new();
    let mut with_trigger = 0;
    let mut node_types: Vec<NodeTypeCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for analysis in analyses {
        node_counts.push(analysis.node_count);
        if analysis.has_trigger {
            with_trigger += 1;
        }
        for node_type in &analysis.node_types {
            match index.get(node_type.as_str()) {
                Some(&i) => node_types[i].count += 1,
                None => {
                    index.insert(node_type.as_str(), node_types.len());
                    node_types.push(NodeTypeCount {
                        node_type: node_type.clone(),
                        count: 1,
                    });
                }
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts
    node_types.sort_by(|a, b| b.count.cmp(&a.count));

    let total_artifacts = node_counts.len();
    let total_nodes: usize = node_counts.iter().sum();
    let average_nodes = if total_artifacts == 0 {
        0.0
    } else {
        total_nodes as f64 / total_artifacts as f64
    };

    let mut sorted = node_counts;
    sorted.sort_unstable();

    Report {
        total_artifacts,
        total_nodes,
        average_nodes,
        min_nodes: sorted.first().copied(),
        max_nodes: sorted.last().copied(),
        median_nodes: sorted.get(sorted.len() / 2).copied(),
        with_trigger,
        node_types,
    }
}

// =============================================================================
// JSON Format
// =============================================================================

/// One artifact as listed in JSON output.
#[derive(Serialize)]
pub struct JsonArtifact {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub revision_id: String,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

impl JsonArtifact {
    pub fn new(
        reference: &FileReference,
        entry: Option<&CacheEntry>,
        raw_url: Option<String>,
    ) -> Self {
        let parse_error = entry.and_then(|e| match &e.artifact.status {
            ArtifactStatus::Invalid { error } => Some(error.clone()),
            ArtifactStatus::Valid => None,
        });
        Self {
            name: reference.name.clone(),
            path: reference.path.clone(),
            size: reference.size,
            revision_id: reference.revision_id.clone(),
            loaded: entry.is_some(),
            raw_url,
            parse_error,
            analysis: entry.and_then(|e| e.analysis.clone()),
        }
    }
}

/// JSON form of a scan: every matching file plus per-directory counts.
#[derive(Serialize)]
pub struct JsonScan {
    pub version: String,
    pub source: String,
    pub total_files: usize,
    pub folders: BTreeMap<String, usize>,
    pub files: Vec<JsonArtifact>,
}

/// JSON listing of one page.
#[derive(Serialize)]
pub struct JsonListing {
    pub version: String,
    pub source: String,
    pub total_files: usize,
    pub matching_files: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub items: Vec<JsonArtifact>,
}

/// JSON form of a batch load outcome.
#[derive(Serialize)]
pub struct JsonLoadReport {
    pub total: usize,
    pub succeeded: usize,
    pub cancelled: usize,
    pub failed: Vec<JsonFailure>,
}

#[derive(Serialize)]
pub struct JsonFailure {
    pub path: String,
    pub kind: String,
    pub error: String,
}

impl From<&LoadReport> for JsonLoadReport {
    fn from(report: &LoadReport) -> Self {
        Self {
            total: report.total,
            succeeded: report.succeeded,
            cancelled: report.cancelled,
            failed: report
                .failed
                .iter()
                .map(|(path, err)| JsonFailure {
                    path: path.clone(),
                    kind: err.kind().to_string(),
                    error: err.to_string(),
                })
                .collect(),
        }
    }
}

/// Full JSON report: corpus statistics plus the load outcome.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: String,
    pub source: String,
    pub files_scanned: usize,
    pub load: JsonLoadReport,
    pub report: &'a Report,
}

/// Print any serializable value as pretty JSON on stdout.
pub fn write_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

fn write_header(source: &str) {
    println!();
    print!("  ");
    print!("{}", "flowscan".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print!("  {}", "Repository: ".dimmed());
    println!("{}", source);
    println!();
}

/// Print the scan result with its per-directory breakdown.
pub fn write_scan_pretty(source: &str, refs: &[FileReference], folders: &BTreeMap<String, usize>) {
    write_header(source);

    if refs.is_empty() {
        println!("  {}", "No matching files found".yellow());
        println!();
        return;
    }

    println!(
        "  Found {} files across {} directories",
        refs.len().to_string().bold(),
        folders.len()
    );
    println!();

    if folders.len() > 1 {
        println!("  {}", "Directories:".bold());
        for (folder, count) in folders {
            println!("    {:<40} {:>5}", folder.blue(), count);
        }
        println!();
    }
}

/// Print a batch load outcome.
pub fn write_load_summary(report: &LoadReport) {
    if report.is_success() {
        print!("  {}", "✓".green());
    } else {
        print!("  {}", "✗".red());
    }
    println!(
        " Loaded {}/{} workflows",
        report.succeeded.to_string().bold(),
        report.total
    );

    if report.cancelled > 0 {
        println!("    {}", format!("{} cancelled", report.cancelled).yellow());
    }

    if !report.failed.is_empty() {
        println!();
        println!("  {} ({}):", "Failures".bold(), report.failed.len());
        for (path, err) in &report.failed {
            print!("    {:<13}", err.kind().red());
            println!("{}", path.blue());
            println!("                 {}", err.to_string().dimmed());
        }
    }
    println!();
}

/// Print one page of artifacts with their analysis when loaded.
pub fn write_page_pretty(source: &str, page: &Page<JsonArtifact>, total_files: usize) {
    write_header(source);

    if page.total_items != total_files {
        println!(
            "  {}",
            format!(
                "Showing {} of {} files after applying filters",
                page.total_items, total_files
            )
            .dimmed()
        );
        println!();
    }

    if page.items.is_empty() {
        println!("  {}", "No workflows on this page".yellow());
        println!();
    }

    for item in &page.items {
        println!("  {}", item.name.cyan().bold());
        print!("    {}", item.path.blue());
        println!("  {}", format!("{:.1} KB", item.size as f64 / 1024.0).dimmed());

        match (&item.analysis, &item.parse_error) {
            (Some(a), _) => write_analysis(a),
            (None, Some(error)) => println!("    {} {}", "invalid:".red(), error),
            (None, None) => println!("    {}", "not loaded".dimmed()),
        }
        if let Some(url) = &item.raw_url {
            println!("    {}", url.dimmed());
        }
        println!();
    }

    println!(
        "  {}",
        format!("Page {} of {}", page.page_index + 1, page.total_pages).dimmed()
    );
    println!();
}

fn write_analysis(a: &AnalysisResult) {
    let trigger = if a.has_trigger {
        "yes".green()
    } else {
        "no".red()
    };
    println!(
        "    Nodes: {}  Connections: {}  Trigger: {}  Node types: {}",
        a.node_count,
        a.connection_count,
        trigger,
        a.node_types.len()
    );
    if a.has_custom_name() {
        println!("    Workflow: {}", a.name);
    }
    if let Some(description) = &a.description {
        println!("    Description: {}", truncate(description, 200));
    }
    if !a.node_types.is_empty() {
        let shown: Vec<&str> = a.node_types.iter().take(8).map(String::as_str).collect();
        let more = if a.node_types.len() > 8 { ", ..." } else { "" };
        println!("    Types: {}{}", shown.join(", "), more);
    }
    if !a.tags.is_empty() {
        let tags: Vec<String> = a.tags.iter().take(5).map(|t| format!("[{}]", t)).collect();
        println!("    Tags: {}", tags.join(" ").dimmed());
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Print corpus statistics.
pub fn write_report_pretty(source: &str, report: &Report, top: usize) {
    write_header(source);

    if report.total_artifacts == 0 {
        println!("  {}", "No workflows loaded; nothing to report".yellow());
        println!();
        return;
    }

    println!("  {}", "Summary:".bold());
    println!("    {:<26} {}", "Total workflows", report.total_artifacts);
    println!("    {:<26} {}", "Total nodes", report.total_nodes);
    println!("    {:<26} {:.1}", "Avg nodes/workflow", report.average_nodes);
    println!(
        "    {:<26} {}/{}",
        "Workflows with triggers", report.with_trigger, report.total_artifacts
    );
    println!();

    println!("  {}", "Node count distribution:".bold());
    if let (Some(min), Some(max), Some(median)) =
        (report.min_nodes, report.max_nodes, report.median_nodes)
    {
        println!("    min {}  max {}  median {}", min, max, median);
    }
    println!();

    println!("  {}", "Most popular node types:".bold());
    for (i, entry) in report.top_node_types(top).iter().enumerate() {
        let plural = if entry.count != 1 { "s" } else { "" };
        println!(
            "    {:>2}. {:<40} {} workflow{}",
            i + 1,
            entry.node_type,
            entry.count,
            plural
        );
    }
    println!();
}
