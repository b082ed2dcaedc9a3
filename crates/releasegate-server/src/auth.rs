use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Axum middleware that admits a request only with a valid signed access
/// assertion.
///
/// Preflight `OPTIONS` requests pass through unchecked. On success the
/// verified [`AccessClaims`](releasegate_core::access::AccessClaims) are
/// inserted into the request extensions for handlers to read.
pub async fn admission_middleware(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    match app.access.verify(req.headers()).await {
        Ok(claims) => {
            tracing::debug!("admitted {} for {}", claims.identity, req.uri().path());
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("rejected {} {}: {e}", req.method(), req.uri().path());
            unauthorized(e.code())
        }
    }
}

fn unauthorized(reason: &str) -> Response {
    let body = serde_json::json!({ "error": "unauthorized", "reason": reason });
    Response::builder()
        .status(401)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("infallible: static status and header")
}
