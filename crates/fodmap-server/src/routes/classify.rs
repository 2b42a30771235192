//! Manual classification trigger route.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/v1/classify/run", post(run_classification))
}

/// POST /api/v1/classify/run — run one classification pass now.
///
/// Honors the same overlap lock as the scheduler: if a run is already
/// active the trigger is rejected rather than queued. A single attempt,
/// no retry schedule — this path is latency-sensitive.
pub async fn run_classification(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !state.overlap_lock.try_acquire() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a classification run is already active" })),
        );
    }

    let result = state.job.run_pass().await;
    state.overlap_lock.release();

    match result {
        Ok(outcome) => {
            info!(
                "Manual classification run: processed={}, remaining={}",
                outcome.processed, outcome.remaining
            );
            (
                StatusCode::OK,
                Json(json!({
                    "processed": outcome.processed,
                    "remaining": outcome.remaining,
                })),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}
