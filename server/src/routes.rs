use axum::{
    extract::Request,
    routing::{get, post},
    Json,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;

use crate::state::AppState;

pub mod google;
pub mod mcp;

/// Build the application router with all routes
pub fn routes(app_state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        // Google OAuth routes
        .route("/authorize", get(google::authorize))
        .route("/oauth2callback", get(google::callback))
        .route("/status", get(google::status))
        .route("/revoke", post(google::revoke))
        // MCP over HTTP
        .route("/mcp", post(mcp::mcp_endpoint))
        .layer(
            ServiceBuilder::new()
                .layer(sentry_tower::NewSentryLayer::<Request>::new_from_top())
                .layer(sentry_tower::SentryHttpLayer::with_transaction())
                .layer(tower_http::trace::TraceLayer::new_for_http()),
        )
        .with_state(app_state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Serve `routes` on `listener` until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, app_state: AppState) -> color_eyre::Result<()> {
    tracing::info!(addr = ?listener.local_addr()?, "Listening");
    axum::serve(listener, routes(app_state)).await?;
    Ok(())
}

/// Bind the configured address and serve.
pub async fn run_server(app_state: AppState) -> color_eyre::Result<()> {
    let listener = tokio::net::TcpListener::bind(app_state.settings.bind_addr()).await?;
    serve(listener, app_state).await
}
