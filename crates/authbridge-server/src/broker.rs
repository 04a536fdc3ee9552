//! Token broker endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use authbridge_auth::TokenBroker;

/// Router serving the broker at `/`
///
/// Replies are always HTTP 200. Failures carry `status`, `code` and the
/// failing `step`.
pub fn router(broker: Arc<TokenBroker>) -> Router {
    Router::new()
        .route("/", get(handle))
        .layer(TraceLayer::new_for_http())
        .with_state(broker)
}

async fn handle(State(broker): State<Arc<TokenBroker>>) -> Json<Value> {
    match broker.handle().await {
        Ok(reply) => Json(reply),
        Err(e) => Json(json!({
            "status": "error",
            "code": e.kind().code(),
            "step": e.step.as_str(),
        })),
    }
}
