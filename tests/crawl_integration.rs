//! Crawl, cache and load behavior against an in-memory repository.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flowscan::{
    CrawlerConfig, DirectoryEntry, LoadError, RepositoryApi, ScanError, SourceError,
    WorkflowManager,
};

const LOCATOR_PREFIX: &str = "mem://";

/// Repository whose directory tree is derived from a flat path -> bytes map.
struct MemoryRepo {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    revision: RwLock<String>,
    failing: HashSet<String>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl MemoryRepo {
    fn new(files: &[(&str, String)]) -> Self {
        Self {
            files: RwLock::new(
                files
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.clone().into_bytes()))
                    .collect(),
            ),
            revision: RwLock::new("rev-1".to_string()),
            failing: HashSet::new(),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn set_revision(&self, revision: &str) {
        *self.revision.write().unwrap() = revision.to_string();
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryApi for MemoryRepo {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, SourceError> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let revision = self.revision.read().unwrap().clone();
        let files = self.files.read().unwrap();

        let mut entries = Vec::new();
        let mut dirs = BTreeSet::new();
        for (file, bytes) in files.iter() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(format!("{}{}", prefix, dir));
                }
                None => entries.push(DirectoryEntry::file(
                    file,
                    bytes.len() as u64,
                    &format!("{}{}", LOCATOR_PREFIX, file),
                    &revision,
                )),
            }
        }
        if entries.is_empty() && dirs.is_empty() && !path.is_empty() {
            return Err(SourceError::NotFound(path.to_string()));
        }
        entries.extend(dirs.iter().map(|d| DirectoryEntry::dir(d)));
        Ok(entries)
    }

    async fn fetch_raw(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let path = locator.trim_start_matches(LOCATOR_PREFIX);
        if self.failing.contains(path) {
            return Err(SourceError::Status(503));
        }
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn workflow(name: &str, types: &[&str]) -> String {
    let nodes: Vec<String> = types
        .iter()
        .enumerate()
        .map(|(i, t)| format!(r#"{{"id": "{}", "name": "n{}", "type": "{}"}}"#, i, i, t))
        .collect();
    format!(r#"{{"name": "{}", "nodes": [{}]}}"#, name, nodes.join(","))
}

fn five_with_third_malformed() -> Vec<(&'static str, String)> {
    vec![
        ("wf1.json", workflow("One", &["n8n-nodes-base.webhook", "n8n-nodes-base.set"])),
        ("wf2.json", workflow("Two", &["n8n-nodes-base.set"])),
        ("wf3.json", "{\"name\": \"Three\", \"nodes\": [".to_string()),
        ("wf4.json", workflow("Four", &["n8n-nodes-base.cron", "n8n-nodes-base.code"])),
        ("wf5.json", workflow("Five", &["n8n-nodes-base.httpRequest"])),
    ]
}

fn manager_for(repo: &Arc<MemoryRepo>, config: CrawlerConfig) -> WorkflowManager {
    WorkflowManager::new(repo.clone(), config)
}

#[tokio::test]
async fn test_scan_is_idempotent() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let first = manager.scan().await.unwrap();
    let second = manager.scan().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(repo.fetches(), 0);
}

#[tokio::test]
async fn test_scan_covers_every_depth() {
    let repo = Arc::new(MemoryRepo::new(&[
        ("top.json", workflow("Top", &[])),
        ("a/one.json", workflow("One", &[])),
        ("a/b/c/three.json", workflow("Three", &[])),
        ("a/b/c/readme.md", "notes".to_string()),
    ]));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    let paths: Vec<&str> = refs.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a/one.json", "a/b/c/three.json", "top.json"]);
}

#[tokio::test]
async fn test_scan_depth_limit_aborts() {
    let repo = Arc::new(MemoryRepo::new(&[("a/b/c/deep.json", workflow("Deep", &[]))]));
    let config = CrawlerConfig {
        max_depth: 2,
        ..Default::default()
    };
    let manager = manager_for(&repo, config);

    let err = manager.scan().await.unwrap_err();
    assert!(matches!(err, ScanError::DepthExceeded { max_depth: 2, .. }));
}

#[tokio::test]
async fn test_cancelled_manager_does_not_scan() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    manager.cancel_token().cancel();
    assert!(matches!(manager.scan().await, Err(ScanError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_opens_a_new_scope() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    manager.cancel_token().cancel();
    assert!(matches!(manager.scan().await, Err(ScanError::Cancelled)));
    manager.clear();
    assert!(matches!(manager.scan().await, Err(ScanError::Cancelled)));

    manager.cancel();
    let refs = manager.scan().await.unwrap();
    assert_eq!(refs.len(), 5);
    let load = manager.load_all(&refs, |_| {}).await;
    assert_eq!(load.succeeded, 4);
    assert!(!load.was_cancelled());
}

#[tokio::test]
async fn test_reload_after_aborted_load() {
    let repo = Arc::new(
        MemoryRepo::new(&five_with_third_malformed()).delay(Duration::from_millis(100)),
    );
    let config = CrawlerConfig {
        concurrency: 2,
        ..Default::default()
    };
    let manager = manager_for(&repo, config);
    let refs = manager.scan().await.unwrap();

    let (aborted, ()) = tokio::join!(manager.load_all(&refs, |_| {}), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.cancel();
    });
    assert_eq!(aborted.succeeded, 0);
    assert_eq!(aborted.cancelled, 5);
    assert!(manager.cache().is_empty());

    let reload = manager.load_missing(&refs, |_| {}).await;
    assert_eq!(reload.total, 5);
    assert_eq!(reload.succeeded, 4);
    assert_eq!(reload.cancelled, 0);
}

#[tokio::test]
async fn test_partial_failure_does_not_stop_batch() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    let load = manager.load_all(&refs, |_| {}).await;

    assert_eq!(load.total, 5);
    assert_eq!(load.succeeded, 4);
    assert_eq!(load.failed_paths(), vec!["wf3.json"]);
    assert_eq!(load.failed[0].1.kind(), "parse_error");

    let report = manager.report(&refs);
    assert_eq!(report.total_artifacts, 4);
    assert_eq!(report.with_trigger, 2);
}

#[tokio::test]
async fn test_fetch_failure_is_recorded_per_file() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()).failing("wf5.json"));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    let load = manager.load_all(&refs, |_| {}).await;

    assert_eq!(load.succeeded, 3);
    let fetch_failed: Vec<&str> = load
        .failed
        .iter()
        .filter(|(_, e)| matches!(e, LoadError::FetchFailed { .. }))
        .map(|(p, _)| p.as_str())
        .collect();
    assert_eq!(fetch_failed, vec!["wf5.json"]);
    assert!(manager.cache().get("wf5.json").is_none());
}

#[tokio::test]
async fn test_retry_policy_reattempts_server_errors() {
    let repo = Arc::new(MemoryRepo::new(&[("bad.json", workflow("Bad", &[]))]).failing("bad.json"));
    let mut config = CrawlerConfig::default();
    config.retry.max_attempts = 3;
    config.retry.backoff_ms = 0;
    let manager = manager_for(&repo, config);

    let refs = manager.scan().await.unwrap();
    let load = manager.load_all(&refs, |_| {}).await;

    assert_eq!(load.failed.len(), 1);
    assert_eq!(repo.fetches(), 3);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let files: Vec<(String, String)> = (0..12)
        .map(|i| (format!("wf{:02}.json", i), workflow("W", &["n8n-nodes-base.set"])))
        .collect();
    let borrowed: Vec<(&str, String)> = files
        .iter()
        .map(|(p, b)| (p.as_str(), b.clone()))
        .collect();
    let repo = Arc::new(MemoryRepo::new(&borrowed).delay(Duration::from_millis(20)));
    let config = CrawlerConfig {
        concurrency: 3,
        ..Default::default()
    };
    let manager = manager_for(&repo, config);

    let refs = manager.scan().await.unwrap();
    let mut seen = Vec::new();
    let load = manager
        .load_all(&refs, |p| seen.push(p.completed))
        .await;

    assert_eq!(load.succeeded, 12);
    assert!(repo.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(seen, (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_cached_entries_are_not_refetched() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    manager.load_all(&refs, |_| {}).await;
    assert_eq!(repo.fetches(), 5);

    let again = manager.load_missing(&refs, |_| {}).await;
    assert_eq!(again.total, 0);
    assert_eq!(repo.fetches(), 5);
}

#[tokio::test]
async fn test_revision_change_invalidates_entries() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    manager.load_all(&refs, |_| {}).await;

    repo.set_revision("rev-2");
    let refs = manager.scan().await.unwrap();
    assert!(manager.loaded_analyses(&refs).is_empty());

    let reload = manager.load_missing(&refs, |_| {}).await;
    assert_eq!(reload.total, 5);
    assert_eq!(manager.loaded_analyses(&refs).len(), 4);
}

#[tokio::test]
async fn test_expired_entries_are_reloaded() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let config = CrawlerConfig {
        cache_ttl_secs: 0,
        ..Default::default()
    };
    let manager = manager_for(&repo, config);

    let refs = manager.scan().await.unwrap();
    manager.load_all(&refs, |_| {}).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(manager.cache().get("wf1.json").is_none());
    assert!(manager.cache().stats().expired >= 1);

    let reload = manager.load_missing(&refs, |_| {}).await;
    assert_eq!(reload.total, 5);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    manager.load_all(&refs, |_| {}).await;
    assert_eq!(manager.cache().len(), 5);

    assert!(manager.remove("wf1.json"));
    assert!(!manager.remove("wf1.json"));
    assert_eq!(manager.report(&refs).total_artifacts, 3);

    manager.clear();
    assert!(manager.cache().is_empty());
    assert_eq!(manager.report(&refs).total_artifacts, 0);
}

#[tokio::test]
async fn test_memory_repo_has_no_raw_url() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());
    assert_eq!(manager.raw_url("wf1.json"), None);
    assert_eq!(manager.source(), "memory");
}

#[tokio::test]
async fn test_cache_stats_count_load_decisions_only() {
    let repo = Arc::new(MemoryRepo::new(&five_with_third_malformed()));
    let manager = manager_for(&repo, CrawlerConfig::default());

    let refs = manager.scan().await.unwrap();
    manager.load_all(&refs, |_| {}).await;
    let before = manager.cache().stats();

    manager.report(&refs);
    manager.filter(&refs, &flowscan::FilterCriteria::default());
    manager.loaded_analyses(&refs);
    assert_eq!(manager.cache().stats(), before);

    manager.load_missing(&refs, |_| {}).await;
    let after = manager.cache().stats();
    assert_eq!(after.hits, before.hits + 5);
}
