use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use releasegate_core::access::AccessClaims;
use releasegate_core::deploy::DeployRequest;

use crate::error::AppError;
use crate::state::AppState;

/// POST /deploy: promote `{app, env, commit}`.
///
/// 202 means the build was triggered, not that it finished; poll
/// `/status` for the outcome.
pub async fn deploy(
    State(app): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let req: DeployRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::bad_request("Invalid JSON body"))?;
    let actor = Some(claims.identity.as_str());

    let outcome = app.deployer.deploy(&req, actor).await?;
    tracing::info!(
        "deploy accepted: {}/{} -> {} by {}",
        outcome.app,
        outcome.env,
        outcome.commit,
        claims.identity
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "action": "deploy",
            "app": outcome.app,
            "env": outcome.env,
            "sourceBranch": outcome.source_branch,
            "releaseBranch": outcome.release_branch,
            "commit": outcome.commit,
            "message": outcome.message,
            "status": "ACCEPTED",
            "trigger": { "type": "deploy_hook", "httpStatus": outcome.hook_status },
        })),
    ))
}
