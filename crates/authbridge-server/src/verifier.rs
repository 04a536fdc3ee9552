//! Bearer verification endpoint
//!
//! `GET /` answers HTTP 200 with `{"status":"verified"}` or
//! `{"status":"error","code":...}`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use authbridge_auth::BearerVerifier;

/// Router serving the verifier at `/`
pub fn router(verifier: Arc<BearerVerifier>) -> Router {
    Router::new()
        .route("/", get(verify))
        .layer(TraceLayer::new_for_http())
        .with_state(verifier)
}

async fn verify(State(verifier): State<Arc<BearerVerifier>>, headers: HeaderMap) -> Json<Value> {
    // Non-ASCII header values count as absent
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    match verifier.verify_request(authorization).await {
        Ok(token) => {
            info!(subject = ?token.claims.sub, key_id = ?token.key_id, "Request verified");
            Json(json!({"status": "verified"}))
        }
        Err(e) => {
            warn!(code = e.code(), error = %e, "Request rejected");
            Json(json!({"status": "error", "code": e.code()}))
        }
    }
}
