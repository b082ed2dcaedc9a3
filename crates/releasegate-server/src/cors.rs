//! CORS for the dashboard origins.
//!
//! Every response carries the full header set. A request from an origin that
//! is not allow-listed gets `access-control-allow-origin: null` rather than no
//! header at all, so browsers reject it explicitly.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

const ALLOW_METHODS: &str = "GET,POST,OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "content-type,authorization";

/// Value for `access-control-allow-origin`: the request origin when
/// allow-listed, otherwise `null`.
pub fn allowed_origin(origin: Option<&str>, allowed: &[String]) -> String {
    match origin {
        Some(o) if allowed.iter().any(|a| a == o) => o.to_string(),
        _ => "null".to_string(),
    }
}

fn apply_headers(headers: &mut HeaderMap, origin: &str, request_headers: Option<HeaderValue>) {
    let origin = HeaderValue::from_str(origin).unwrap_or(HeaderValue::from_static("null"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        request_headers.unwrap_or(HeaderValue::from_static(DEFAULT_ALLOW_HEADERS)),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

/// Outermost middleware. Answers preflight with 204 and decorates every other
/// response, including admission failures and 404s.
pub async fn cors_middleware(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let origin = allowed_origin(
        req.headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok()),
        &app.config.cors.allowed_origins,
    );
    let request_headers = req
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .filter(|v| !v.is_empty())
        .cloned();

    let mut resp = if req.method() == Method::OPTIONS {
        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::NO_CONTENT;
        resp
    } else {
        next.run(req).await
    };
    apply_headers(resp.headers_mut(), &origin, request_headers);
    resp
}
