//! Health check endpoint for container orchestration.
//!
//! A liveness probe: it answers as long as the process serves HTTP and does
//! not touch the session provider.

use axum::Json;
use serde::Serialize;

use crate::config::HEALTH_MESSAGE;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub message: &'static str,
}

/// Health check handler.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        message: HEALTH_MESSAGE,
    })
}
