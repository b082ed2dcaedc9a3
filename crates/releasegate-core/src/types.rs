use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{GateError, Result};

/// Maximum characters kept from a commit's first message line.
pub const MESSAGE_MAX_CHARS: usize = 80;

fn sha_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("static regex"))
}

/// Trim and check a user-supplied commit reference (7-40 hex chars).
pub fn validate_commit_ref(input: &str) -> Result<&str> {
    let trimmed = input.trim();
    if sha_re().is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(GateError::InvalidCommitFormat(trimmed.to_string()))
    }
}

/// First line of a commit message, capped at [`MESSAGE_MAX_CHARS`].
pub fn first_line(message: &str) -> String {
    message
        .split('\n')
        .next()
        .unwrap_or("")
        .chars()
        .take(MESSAGE_MAX_CHARS)
        .collect()
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: Option<String>,
    pub short: String,
    pub message: String,
    pub author: Option<String>,
    pub date: Option<String>,
    pub url: Option<String>,
}

/// A commit reference resolved to its canonical id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCommit {
    pub sha: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// DeployEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResult {
    pub hook_status: Option<u16>,
    pub hook_ok: bool,
    pub release_branch: String,
}

/// One immutable audit record of a promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployEvent {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub app: String,
    pub env: String,
    pub commit_sha: String,
    pub commit_msg: String,
    pub actor: Option<String>,
    pub result: HookResult,
}

impl DeployEvent {
    pub fn deploy(
        app: &str,
        env: &str,
        commit: &ResolvedCommit,
        actor: Option<&str>,
        hook_status: u16,
        release_branch: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: Utc::now().trunc_subsecs(3),
            kind: "deploy".to_string(),
            app: app.to_string(),
            env: env.to_string(),
            commit_sha: commit.sha.clone(),
            commit_msg: commit.message.clone(),
            actor: actor.map(str::to_string),
            result: HookResult {
                hook_status: Some(hook_status),
                hook_ok: (200..300).contains(&hook_status),
                release_branch: release_branch.to_string(),
            },
        }
    }

    /// Store key: `event:<ts>:<id>`. Millisecond RFC 3339 keeps lexical order
    /// equal to chronological order.
    pub fn store_key(&self) -> String {
        format!(
            "{}{}:{}",
            EVENT_KEY_PREFIX,
            self.ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.id
        )
    }
}

pub const EVENT_KEY_PREFIX: &str = "event:";

// ---------------------------------------------------------------------------
// DeployOutcome
// ---------------------------------------------------------------------------

/// Accepted (not completed) promotion. Build and publish happen downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub app: String,
    pub env: String,
    pub source_branch: String,
    pub release_branch: String,
    pub commit: String,
    pub message: String,
    pub hook_status: u16,
}
