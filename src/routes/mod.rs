//! HTTP route handlers for the JSON API.
//!
//! Scan results are never cached. Every request runs inside a span with a
//! unique request ID, so logs from a scan correlate with the call that
//! started it. CORS is permissive for browser front-ends on other origins.

pub mod health;
pub mod scrape;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::CACHE_CONTROL_NO_STORE;
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with all routes and layers.
pub fn create_router(state: AppState) -> Router {
    // Scrape - live data, never cached
    let scrape_routes = Router::new()
        .route("/scrape", post(scrape::scrape))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        ));

    // Health check - always fresh for liveness probes
    let health_routes = Router::new().route("/health", get(health::health));

    Router::new()
        .merge(scrape_routes)
        .merge(health_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
