use axum::Json;

use crate::error::AppError;

/// GET /: liveness, behind admission like everything else.
pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "service": "releasegate" }))
}

/// Fallback for unknown paths.
pub async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}
