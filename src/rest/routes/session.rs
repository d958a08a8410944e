// rest/routes/session.rs — session status, reset, and listing.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::session::DEFAULT_SESSION;
use crate::AppContext;

#[derive(Deserialize)]
pub struct StatusQuery {
    pub session: Option<String>,
}

pub async fn status(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<StatusQuery>,
) -> Json<Value> {
    let key = query.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let state = ctx.store.get(key).await;
    Json(json!({
        "session": key,
        "counter": state.repetition_count,
        "current_stage": state.current_stage.to_string(),
        "class": state.last_label.clone().unwrap_or_default(),
        "probability": state.probability(),
        "set_count": state.set_count,
    }))
}

#[derive(Deserialize, Default)]
pub struct ResetRequest {
    pub session: Option<String>,
}

pub async fn reset(
    State(ctx): State<Arc<AppContext>>,
    body: Option<Json<ResetRequest>>,
) -> Json<Value> {
    let Json(body) = body.unwrap_or_default();
    let key = body.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let state = ctx.store.reset(key).await;
    ctx.metrics.inc_resets();
    Json(json!({
        "message": "Counter reset",
        "session": key,
        "counter": state.repetition_count,
    }))
}

pub async fn list_sessions(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let sessions = ctx.store.list().await;
    let list: Vec<Value> = sessions
        .iter()
        .map(|(key, s)| {
            json!({
                "session": key,
                "counter": s.repetition_count,
                "current_stage": s.current_stage.to_string(),
                "set_count": s.set_count,
                "created_at": s.created_at,
                "updated_at": s.updated_at,
            })
        })
        .collect();
    Json(json!({ "sessions": list }))
}
