//! Best-effort view of what the deployment platform reports for one target.
//!
//! Upstream failures never escape [`StatusReconciler::get_status`]; they are
//! folded into the report so pollers keep getting a well-formed answer.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::pages::PagesClient;

// ---------------------------------------------------------------------------
// Field precedence tables (JSON pointers, first non-empty string wins)
// ---------------------------------------------------------------------------

const BRANCH_FIELDS: &[&str] = &["/deployment_trigger/metadata/branch"];

const COMMIT_FIELDS: &[&str] = &[
    "/deployment_trigger/metadata/commit_hash",
    "/deployment_trigger/metadata/commit",
    "/source/commit_hash",
    "/source/commit",
];

const MESSAGE_FIELDS: &[&str] = &[
    "/deployment_trigger/metadata/commit_message",
    "/deployment_trigger/metadata/message",
];

const ID_FIELDS: &[&str] = &["/id"];
const URL_FIELDS: &[&str] = &["/url"];
const CREATED_FIELDS: &[&str] = &["/created_on"];
const STAGE_FIELDS: &[&str] = &["/latest_stage/status"];

pub const NO_DEPLOYMENTS: &str = "No deployments returned.";

fn extract(deployment: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| {
        deployment
            .pointer(p)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

// ---------------------------------------------------------------------------
// Stage classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Success,
    Failure,
    Unknown,
}

impl StageState {
    pub fn classify(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return Self::Unknown;
        };
        match status.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failure" | "failed" | "canceled" | "cancelled" | "skipped" => Self::Failure,
            "queued" | "initialize" | "initializing" | "building" | "deploying" | "active"
            | "idle" | "pending" => Self::Pending,
            _ => Self::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Report shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSnapshot {
    pub project: String,
    pub deployment_id: Option<String>,
    pub deployment_url: Option<String>,
    pub created_on: Option<String>,
    pub commit: Option<String>,
    pub message: Option<String>,
    pub branch: Option<String>,
    pub stage_status: Option<String>,
    pub stage_state: StageState,
}

impl DeploymentSnapshot {
    fn normalize(project: &str, d: &Value) -> Self {
        let stage_status = extract(d, STAGE_FIELDS);
        Self {
            project: project.to_string(),
            deployment_id: extract(d, ID_FIELDS),
            deployment_url: extract(d, URL_FIELDS),
            created_on: extract(d, CREATED_FIELDS),
            commit: extract(d, COMMIT_FIELDS),
            message: extract(d, MESSAGE_FIELDS),
            branch: extract(d, BRANCH_FIELDS),
            stage_state: StageState::classify(stage_status.as_deref()),
            stage_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PagesView {
    Deployment(DeploymentSnapshot),
    Unavailable { project: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub action: &'static str,
    pub app: String,
    pub env: String,
    pub expected_branch: String,
    pub pages: PagesView,
}

/// First deployment built from `branch`, else the newest one.
pub fn latest_for_branch<'a>(deployments: &'a [Value], branch: &str) -> Option<&'a Value> {
    deployments
        .iter()
        .find(|d| extract(d, BRANCH_FIELDS).as_deref() == Some(branch))
        .or_else(|| deployments.first())
}

// ---------------------------------------------------------------------------
// StatusReconciler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StatusReconciler {
    config: Arc<Config>,
    pages: PagesClient,
}

impl StatusReconciler {
    pub fn new(config: Arc<Config>, pages: PagesClient) -> Self {
        Self { config, pages }
    }

    /// Errors only for an unknown app or env.
    pub async fn get_status(&self, app: &str, env: &str) -> Result<StatusReport> {
        let target = self.config.target(app, env)?;
        let project = target.project.to_string();

        let pages = match self.pages.list_deployments(&project).await {
            Ok(deployments) => match latest_for_branch(&deployments, target.release_branch) {
                Some(d) => PagesView::Deployment(DeploymentSnapshot::normalize(&project, d)),
                None => PagesView::Unavailable {
                    project,
                    error: NO_DEPLOYMENTS.to_string(),
                },
            },
            Err(e) => {
                tracing::warn!("status lookup for {app}/{env} failed: {e}");
                PagesView::Unavailable {
                    project,
                    error: e.to_string(),
                }
            }
        };

        Ok(StatusReport {
            action: "status",
            app: target.app.to_string(),
            env: target.env.to_string(),
            expected_branch: target.release_branch.to_string(),
            pages,
        })
    }
}
