//! Source-control client: commit listing, commit resolution and the
//! release-branch force update.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::GitHubConfig;
use crate::error::{GateError, Result};
use crate::types::{first_line, Commit, ResolvedCommit};

pub const MAX_COMMITS: usize = 50;
pub const DEFAULT_COMMITS: usize = 10;

const USER_AGENT: &str = concat!("releasegate/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ApiCommit {
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    commit: Option<ApiCommitDetail>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiCommitDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    author: Option<ApiAuthor>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    message: Option<String>,
}

impl ApiCommit {
    fn message(&self) -> String {
        first_line(
            self.commit
                .as_ref()
                .and_then(|c| c.message.as_deref())
                .unwrap_or(""),
        )
    }

    fn into_commit(self) -> Commit {
        let short = self
            .sha
            .as_deref()
            .map(|s| s.chars().take(7).collect())
            .unwrap_or_default();
        let message = self.message();
        let author = self.commit.as_ref().and_then(|c| c.author.as_ref());
        Commit {
            short,
            message,
            author: author.and_then(|a| a.name.clone()),
            date: author.and_then(|a| a.date.clone()),
            url: self.html_url,
            sha: self.sha,
        }
    }
}

/// Pick the most specific message from a GitHub error response.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .filter(|m| !m.is_empty())
        .or_else(|| parsed.errors.into_iter().find_map(|e| e.message))
        .unwrap_or_else(|| format!("GitHub API error ({})", status.as_u16()))
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, config: GitHubConfig) -> Self {
        Self { http, config }
    }

    fn repo_url(&self, path: &str) -> Result<(String, &str)> {
        match (&self.config.owner, &self.config.repo, &self.config.token) {
            (Some(owner), Some(repo), Some(token)) => Ok((
                format!(
                    "{}/repos/{owner}/{repo}{path}",
                    self.config.api_base.trim_end_matches('/')
                ),
                token.as_str(),
            )),
            _ => Err(GateError::MissingCredentials("GH_OWNER / GH_REPO / GH_TOKEN")),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let (url, token) = self.repo_url(path)?;
        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .header("accept", "application/vnd.github+json")
            .header("user-agent", USER_AGENT)
            .query(query);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req
            .send()
            .await
            .map_err(|e| GateError::Upstream(format!("GitHub request failed: {e}")))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| GateError::Upstream(format!("GitHub response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(GateError::Upstream(error_message(status, &text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| GateError::Upstream(format!("unexpected GitHub response: {e}")))
    }

    /// Most recent commits on `branch`, newest first. `limit` is clamped to 1..=50.
    pub async fn list_commits(&self, branch: &str, limit: usize) -> Result<Vec<Commit>> {
        let per_page = limit.clamp(1, MAX_COMMITS);
        let commits: Vec<ApiCommit> = self
            .call(
                Method::GET,
                "/commits",
                &[("sha", branch.to_string()), ("per_page", per_page.to_string())],
                None,
            )
            .await?;
        Ok(commits.into_iter().map(ApiCommit::into_commit).collect())
    }

    /// Resolve a (possibly abbreviated) commit id to the full sha and first message line.
    pub async fn resolve_commit(&self, commitish: &str) -> Result<ResolvedCommit> {
        let commit: ApiCommit = self
            .call(Method::GET, &format!("/commits/{commitish}"), &[], None)
            .await
            .map_err(|e| match e {
                GateError::Upstream(msg) => GateError::CommitNotFound(msg),
                other => other,
            })?;
        let message = commit.message();
        let sha = commit
            .sha
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GateError::CommitNotFound(commitish.to_string()))?;
        Ok(ResolvedCommit { sha, message })
    }

    /// Force-move `refs/heads/<branch>` to `sha`.
    pub async fn update_branch_ref(&self, branch: &str, sha: &str) -> Result<()> {
        self.call::<serde_json::Value>(
            Method::PATCH,
            &format!("/git/refs/heads/{branch}"),
            &[],
            Some(serde_json::json!({ "sha": sha, "force": true })),
        )
        .await
        .map_err(|e| match e {
            GateError::Upstream(message) => GateError::PointerUpdate {
                branch: branch.to_string(),
                message,
            },
            other => other,
        })?;
        Ok(())
    }
}
