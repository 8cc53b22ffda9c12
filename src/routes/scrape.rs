//! Handler for scanning a group's message history.
//!
//! The body is validated before the request is admitted, so a malformed
//! request never consumes the cool-down. The scan itself runs in its own task
//! holding the scan permit: a client that disconnects mid-scan does not abort
//! the session half way.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::{instrument, Instrument};

use crate::error::AppError;
use crate::middleware::RequestId;
use crate::scan::{normalize_group_identifier, ScanResult};
use crate::service::ScanRequest;
use crate::state::AppState;

/// JSON body of `POST /scrape`
#[derive(Debug, Deserialize)]
pub struct ScrapeBody {
    /// `https://t.me/<name>`, `@<name>` or `<name>`
    #[serde(default)]
    pub group_link: Option<String>,
    /// Only count messages from the last N hours; 0 or absent for no bound
    #[serde(default)]
    pub time_limit_hours: Option<u64>,
    /// Messages to scan; defaults to the configured limit, capped at the maximum
    #[serde(default)]
    pub message_limit: Option<u64>,
}

/// Scans a group and returns its senders ranked by message count.
#[instrument(name = "scrape::handler", skip_all)]
pub async fn scrape(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ScrapeBody>, JsonRejection>,
) -> Result<Json<ScanResult>, AppError> {
    let Json(body) = payload?;

    let group_link = body
        .group_link
        .as_deref()
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .ok_or(AppError::MissingGroupLink)?;

    let message_limit = state
        .scraper
        .resolve_limit(body.message_limit)
        .ok_or_else(|| {
            AppError::InvalidRequest("message_limit must be a positive integer".to_string())
        })?;

    let request = ScanRequest {
        identifier: normalize_group_identifier(group_link),
        message_limit,
        time_limit_hours: body.time_limit_hours,
    };

    let permit = state.scraper.admit()?;
    tracing::info!(group = %request.identifier, "Scan admitted");

    let scraper = state.scraper.clone();
    let result = tokio::spawn(async move { scraper.run(permit, request).await }.in_current_span())
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id.0, error = %e, "Scan task did not complete");
            AppError::Internal(e.to_string())
        })?;

    Ok(Json(result))
}
