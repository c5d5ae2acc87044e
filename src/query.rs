//! Filtering and pagination over scanned references.
//!
//! Filters that need an analysis (node count, node types) only apply to
//! artifacts that are loaded. Unloaded references always pass them, so
//! nothing is hidden before it has been looked at.

use serde::Serialize;

use crate::analyze::AnalysisResult;
use crate::cache::ArtifactCache;
use crate::model::FileReference;

/// Filter criteria. All fields are optional and combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Case-insensitive match on file name, path or workflow name
    pub search_term: Option<String>,
    /// Case-insensitive match on the directory part of the path
    pub folder: Option<String>,
    /// Inclusive lower bound on node count
    pub min_nodes: Option<usize>,
    /// Inclusive upper bound on node count
    pub max_nodes: Option<usize>,
    /// Case-insensitive match on the space-joined node types
    pub node_type_contains: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        needle(&self.search_term).is_none()
            && needle(&self.folder).is_none()
            && self.min_nodes.is_none()
            && self.max_nodes.is_none()
            && needle(&self.node_type_contains).is_none()
    }

    fn needs_analysis(&self) -> bool {
        self.min_nodes.is_some()
            || self.max_nodes.is_some()
            || needle(&self.node_type_contains).is_some()
    }

    fn passes_reference(&self, reference: &FileReference, analysis: Option<&AnalysisResult>) -> bool {
        if let Some(term) = needle(&self.search_term) {
            let hit = reference.name.to_lowercase().contains(&term)
                || reference.path.to_lowercase().contains(&term)
                || analysis.is_some_and(|a| a.name.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }

        if let Some(folder) = needle(&self.folder) {
            if !reference.directory().to_lowercase().contains(&folder) {
                return false;
            }
        }

        true
    }

    fn passes_analysis(&self, analysis: &AnalysisResult) -> bool {
        let min = self.min_nodes.unwrap_or(0);
        let max = self.max_nodes.unwrap_or(usize::MAX);
        if analysis.node_count < min || analysis.node_count > max {
            return false;
        }

        if let Some(node_type) = needle(&self.node_type_contains) {
            if !analysis.node_types_text().contains(&node_type) {
                return false;
            }
        }

        true
    }
}

/// Lowercased, trimmed search text; blank counts as unset.
fn needle(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// Apply `criteria` to `refs`, keeping their order.
///
/// An artifact counts as loaded when the cache holds a fresh analysis for
/// its current revision. Lookups here do not count towards cache stats.
pub fn filter(
    refs: &[FileReference],
    cache: &ArtifactCache,
    criteria: &FilterCriteria,
) -> Vec<FileReference> {
    if criteria.is_empty() {
        return refs.to_vec();
    }

    refs.iter()
        .filter(|reference| {
            let entry = cache.peek_fresh(reference);
            let analysis = entry.as_ref().and_then(|e| e.analysis.as_ref());

            if !criteria.passes_reference(reference, analysis) {
                return false;
            }
            match analysis {
                Some(analysis) if criteria.needs_analysis() => criteria.passes_analysis(analysis),
                _ => true,
            }
        })
        .cloned()
        .collect()
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 0 && self.page_index < self.total_pages
    }
}

/// Slice out page `page_index` (zero-based) of `items`.
///
/// A page size of zero is treated as one. An index past the last page
/// yields an empty page. An empty input still has one (empty) page.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, page_index: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);

    let start = page_index.saturating_mul(page_size);
    let page_items = if start >= total_items {
        Vec::new()
    } else {
        let end = start.saturating_add(page_size).min(total_items);
        items[start..end].to_vec()
    };

    Page {
        items: page_items,
        page_index,
        page_size,
        total_items,
        total_pages,
    }
}
