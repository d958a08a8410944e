use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    Json(json!({
        "status": "healthy",
        "message": "liftd is running",
        "classifier": ctx.classifier.name(),
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn index() -> Json<Value> {
    Json(json!({ "status": "healthy", "message": "liftd pose API. See /health" }))
}

pub async fn metrics(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(ctx.metrics.snapshot())
}
