//! Remote repository source backed by the GitHub REST API.
//!
//! Files are listed with the recursive git trees endpoint and fetched one by
//! one through the contents endpoint (base64 payload), both keyed by ref.

use super::{ContentSource, ListingRules};
use base64::Engine;
use codepilot_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

pub struct GitHubSource {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    git_ref: String,
    token: Option<String>,
    rules: ListingRules,
}

impl GitHubSource {
    /// Create a source for `owner/repo` at `git_ref`.
    pub fn new(
        repository: &str,
        git_ref: impl Into<String>,
        token: Option<String>,
        rules: ListingRules,
        timeout: Duration,
    ) -> AppResult<Self> {
        let (owner, repo) = parse_repository(repository)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("codepilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Knowledge(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: DEFAULT_GITHUB_API.to_string(),
            owner,
            repo,
            git_ref: git_ref.into(),
            token,
            rules,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn filter_tree(&self, response: TreeResponse) -> Vec<String> {
        if response.truncated {
            tracing::warn!(
                "Tree listing for {}/{} was truncated by the API",
                self.owner,
                self.repo
            );
        }
        let mut files: Vec<String> = response
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter(|entry| !self.rules.ignores_path(&entry.path))
            .filter(|entry| self.rules.allows_file(&entry.path, entry.size.unwrap_or(0)))
            .map(|entry| entry.path)
            .collect();
        files.sort();
        files
    }
}

#[async_trait::async_trait]
impl ContentSource for GitHubSource {
    fn describe(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.git_ref)
    }

    #[instrument(skip(self), fields(repo = %self.describe()))]
    async fn list_files(&self) -> AppResult<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, self.git_ref
        );
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to reach GitHub: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(&self.describe(), status, &body));
        }
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Invalid tree listing: {}", e)))?;

        Ok(self.filter_tree(tree))
    }

    #[instrument(skip(self))]
    async fn read(&self, file_path: &str) -> AppResult<Vec<u8>> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, self.owner, self.repo, file_path, self.git_ref
        );
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", file_path, e)))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(file_path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(file_path, status, &body));
        }
        let content: ContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Invalid content response: {}", e)))?;

        decode_payload(file_path, &content)
    }
}

fn parse_repository(repository: &str) -> AppResult<(String, String)> {
    let trimmed = repository.trim().trim_end_matches(".git");
    let trimmed = trimmed
        .strip_prefix("https://github.com/")
        .unwrap_or(trimmed);
    match trimmed.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(AppError::Config(format!(
            "Expected a repository as owner/repo, got '{}'",
            repository
        ))),
    }
}

fn decode_payload(file_path: &str, content: &ContentResponse) -> AppResult<Vec<u8>> {
    if content.encoding != "base64" {
        return Err(AppError::Decode {
            path: file_path.to_string(),
            reason: format!("unsupported content encoding '{}'", content.encoding),
        });
    }
    let compact: String = content.content.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| AppError::Decode {
            path: file_path.to_string(),
            reason: format!("invalid base64 payload: {}", e),
        })
}

fn api_error(target: &str, status: StatusCode, body: &str) -> AppError {
    AppError::Knowledge(format!("GitHub API error for {} ({}): {}", target, status, body))
}
