//! GitHub repository client.
//!
//! Lists directories via: GET {api}/repos/{owner}/{repo}/contents/{path}?ref={branch}
//! Downloads raw bytes via the `download_url` of each file entry.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use super::{DirectoryEntry, EntryKind, RepositoryApi};
use crate::config::CrawlerConfig;
use crate::error::SourceError;

const RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Contents API client bound to one repository and branch.
pub struct GitHubApi {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    list_timeout: Duration,
    fetch_timeout: Duration,
}

impl GitHubApi {
    /// Create a client for the repository named in the configuration.
    pub fn new(config: &CrawlerConfig) -> Result<Self, SourceError> {
        let http = Client::builder().user_agent(&config.user_agent).build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            list_timeout: config.list_timeout(),
            fetch_timeout: config.fetch_timeout(),
        })
    }

    /// URL of the contents listing for a repository path.
    fn contents_url(&self, path: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        url.query_pairs_mut().append_pair("ref", &self.branch);
        Ok(url)
    }

    fn raw_file_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_BASE,
            self.owner,
            self.repo,
            self.branch,
            path.trim_start_matches('/')
        )
    }
}

fn map_send_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Network(e)
    }
}

fn check_status(status: StatusCode, target: &str) -> Result<(), SourceError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        404 => Err(SourceError::NotFound(target.to_string())),
        429 => Err(SourceError::RateLimited),
        code => Err(SourceError::Status(code)),
    }
}

/// Decode a listing body. A single object means `path` named a file.
fn parse_listing(body: &[u8], path: &str) -> Result<Vec<DirectoryEntry>, SourceError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| SourceError::InvalidListing(format!("{}: {}", path, e)))?;
    if !value.is_array() {
        return Err(SourceError::InvalidListing(format!(
            "{}: expected an array of entries",
            path
        )));
    }
    serde_json::from_value(value).map_err(|e| SourceError::InvalidListing(format!("{}: {}", path, e)))
}

#[async_trait]
impl RepositoryApi for GitHubApi {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, SourceError> {
        let url = self.contents_url(path)?;
        debug!(%url, "listing directory");

        let response = self
            .http
            .get(url)
            .timeout(self.list_timeout)
            .send()
            .await
            .map_err(map_send_error)?;
        check_status(response.status(), path)?;

        let body = response.bytes().await.map_err(map_send_error)?;
        let mut entries = parse_listing(&body, path)?;

        // Files without a download URL still have a raw URL on the branch
        for entry in &mut entries {
            if entry.kind == EntryKind::File && entry.download_url.is_none() {
                entry.download_url = Some(self.raw_file_url(&entry.path));
            }
        }

        Ok(entries)
    }

    async fn fetch_raw(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .http
            .get(locator)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(map_send_error)?;
        check_status(response.status(), locator)?;

        let body = response.bytes().await.map_err(map_send_error)?;
        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.branch)
    }

    fn raw_url(&self, path: &str) -> Option<String> {
        Some(self.raw_file_url(path))
    }
}
