// rest/mod.rs — Public REST API server.
//
// Axum HTTP server carrying the wire contract of the original pose backend
// (local only unless bind_address says otherwise). CORS is fully open, as
// the dashboard may be served from any origin.
//
// Endpoints:
//   GET  /            (health-style index)
//   GET  /health
//   POST /detect      (single image → classify → count → annotated image)
//   POST /stream      (webcam frame, lean response)
//   GET  /status      (?session=)
//   POST /reset
//   GET  /sessions
//   GET  /metrics

pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(routes::health::index))
        .route("/health", get(routes::health::health))
        .route("/detect", post(routes::detect::detect))
        .route("/stream", post(routes::detect::stream))
        .route("/status", get(routes::session::status))
        .route("/reset", post(routes::session::reset))
        .route("/sessions", get(routes::session::list_sessions))
        .route("/metrics", get(routes::health::metrics))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
