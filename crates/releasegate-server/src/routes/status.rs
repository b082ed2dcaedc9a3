use axum::extract::{Query, State};
use axum::Json;
use releasegate_core::status::StatusReport;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    app: Option<String>,
    #[serde(default)]
    env: Option<String>,
}

/// GET /status?app=&env=: what the platform reports for one target.
///
/// Upstream trouble is reported inline under `pages.error` with a 200; only an
/// unknown app or env fails the request.
pub async fn get_status(
    State(app): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusReport>, AppError> {
    let report = app
        .status
        .get_status(
            params.app.as_deref().unwrap_or_default(),
            params.env.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(report))
}
