use axum::{Json, extract::State};

use crate::models::HealthResponse;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.hub.connection_count().await,
        ingest: state.ingest_stats.snapshot(),
    })
}
