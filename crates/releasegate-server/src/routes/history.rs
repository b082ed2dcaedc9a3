use axum::extract::{Query, State};
use axum::Json;
use releasegate_core::audit::HistoryQuery;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    limit: Option<String>,
    #[serde(default)]
    app: Option<String>,
    #[serde(default)]
    env: Option<String>,
}

impl From<HistoryParams> for HistoryQuery {
    fn from(p: HistoryParams) -> Self {
        HistoryQuery {
            limit: p.limit.and_then(|l| l.trim().parse().ok()),
            app: p.app,
            env: p.env,
        }
    }
}

/// GET /history?limit=&app=&env=: recorded deploys, newest first.
pub async fn list_history(
    State(app): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = HistoryQuery::from(params);
    let audit = app.audit.clone();
    let events = tokio::task::spawn_blocking(move || audit.list(&query))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(serde_json::json!({ "events": events })))
}

/// POST /history/clear: delete every recorded deploy.
pub async fn clear_history(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let audit = app.audit.clone();
    let removed = tokio::task::spawn_blocking(move || audit.clear())
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    tracing::info!("cleared {removed} history entries");

    Ok(Json(serde_json::json!({ "ok": true })))
}
