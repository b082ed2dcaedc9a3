pub mod auth;
pub mod cors;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::{middleware, Router};
use releasegate_core::config::Config;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
///
/// Layer order, outermost first: tracing, CORS, admission. CORS therefore
/// decorates 401s and answers preflight before admission runs.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health::index))
        .route("/commits", get(routes::commits::list_commits))
        .route("/deploy", post(routes::deploy::deploy))
        .route("/status", get(routes::status::get_status))
        .route("/history", get(routes::history::list_history))
        .route("/history/clear", post(routes::history::clear_history))
        .fallback(routes::health::not_found)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::admission_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            cors::cors_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the gateway on `port`.
pub async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(config, listener).await
}

/// Start the gateway on a pre-bound listener.
///
/// Useful when `port = 0` and the caller needs the OS-assigned port first.
pub async fn serve_on(config: Config, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    for w in config.validate() {
        tracing::warn!("config: {}", w.message);
    }
    let app = build_router(AppState::from_config(config)?);

    let actual_port = listener.local_addr()?.port();
    tracing::info!("releasegate listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
