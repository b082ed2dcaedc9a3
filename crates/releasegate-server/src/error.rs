use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use releasegate_core::error::GateError;

// ---------------------------------------------------------------------------
// Internal sentinels for statuses that have no GateError variant
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. Every body is `{"error": ...}`,
/// with target details added for a failed deploy hook.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

pub fn status_for(err: &GateError) -> StatusCode {
    match err {
        GateError::UnknownApp(_)
        | GateError::UnknownEnv(_)
        | GateError::InvalidCommitFormat(_)
        | GateError::CommitNotFound(_) => StatusCode::BAD_REQUEST,
        GateError::PointerUpdate { .. }
        | GateError::Hook(_)
        | GateError::HookStatus { .. }
        | GateError::Upstream(_) => StatusCode::BAD_GATEWAY,
        GateError::MissingHookUrl { .. }
        | GateError::MissingCredentials(_)
        | GateError::Store(_)
        | GateError::Config(_)
        | GateError::Io(_)
        | GateError::Yaml(_)
        | GateError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }

        let Some(e) = self.0.downcast_ref::<GateError>() else {
            tracing::error!("unhandled error: {:#}", self.0);
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        };

        let status = status_for(e);
        let body = match e {
            GateError::HookStatus {
                app,
                env,
                release_branch,
                commit,
                ..
            } => serde_json::json!({
                "error": e.to_string(),
                "app": app,
                "env": env,
                "releaseBranch": release_branch,
                "commit": commit,
            }),
            _ => serde_json::json!({ "error": e.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
