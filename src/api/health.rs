//! Health check endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Base paths of the bound things
    pub things: Vec<String>,
}

/// Path the health route is mounted on
pub const HEALTH_PATH: &str = "/health";

/// Liveness probe - is the service running?
async fn health(State(things): State<Arc<Vec<String>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        things: things.as_ref().clone(),
    })
}

/// Build health router listing the bound things
pub fn router(things: Vec<String>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .with_state(Arc::new(things))
}
