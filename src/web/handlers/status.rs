use axum::{Json, extract::State};
use serde::Serialize;

use crate::services::Counters;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub counters: Counters,
}

/// `GET /`: liveness plus request counters
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        counters: state.resolver.counters().await,
    })
}
