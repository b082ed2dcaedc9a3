use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use releasegate_core::error::GateError;
use releasegate_core::github::DEFAULT_COMMITS;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CommitsParams {
    #[serde(default)]
    env: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

impl CommitsParams {
    fn env(&self) -> &str {
        self.env
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or("dev")
    }

    /// Unparseable or zero falls back to the default; the client clamps the rest.
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_COMMITS)
    }
}

/// GET /commits?env=&limit=: recent commits on the env's source branch.
pub async fn list_commits(
    State(app): State<AppState>,
    Query(params): Query<CommitsParams>,
) -> Result<Response, AppError> {
    let env = params.env();
    let branch = app.config.source_branch(env)?.to_string();

    match app.github.list_commits(&branch, params.limit()).await {
        Ok(commits) => Ok(Json(serde_json::json!({
            "env": env,
            "branch": branch,
            "commits": commits,
        }))
        .into_response()),
        // Missing credentials surface like any other upstream failure here.
        Err(e @ (GateError::Upstream(_) | GateError::MissingCredentials(_))) => {
            tracing::warn!("listing commits on {branch} failed: {e}");
            let body = serde_json::json!({ "error": e.to_string(), "env": env, "branch": branch });
            Ok((StatusCode::BAD_GATEWAY, Json(body)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(env: Option<&str>, limit: Option<&str>) -> CommitsParams {
        CommitsParams {
            env: env.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn defaults() {
        let p = params(None, None);
        assert_eq!(p.env(), "dev");
        assert_eq!(p.limit(), DEFAULT_COMMITS);
        assert_eq!(params(Some(""), Some("abc")).env(), "dev");
        assert_eq!(params(None, Some("abc")).limit(), DEFAULT_COMMITS);
        assert_eq!(params(None, Some("0")).limit(), DEFAULT_COMMITS);
    }

    #[test]
    fn explicit_values_pass_through() {
        let p = params(Some("prod"), Some("25"));
        assert_eq!(p.env(), "prod");
        assert_eq!(p.limit(), 25);
        // Clamped to 50 by the GitHub client, not here.
        assert_eq!(params(None, Some("500")).limit(), 500);
    }
}
