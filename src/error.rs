//! HTTP-facing errors.
//!
//! Scan failures are not errors at this layer: they travel inside a
//! successful response as a failure [`ScanResult`]. `AppError` covers requests
//! that never reach a scan, plus unexpected faults.

use axum::{
    extract::rejection::JsonRejection,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};

use crate::scan::ScanResult;
use crate::service::AdmissionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing group_link in request body")]
    MissingGroupLink,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("Server error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::MissingGroupLink | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Admission(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            AppError::Admission(
                AdmissionError::Busy {
                    retry_after_seconds,
                }
                | AdmissionError::CoolingDown {
                    retry_after_seconds,
                },
            ) => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after_seconds();

        match &self {
            AppError::Internal(_) => tracing::error!(error = %self, "Internal error"),
            _ => tracing::warn!(status = status.as_u16(), error = %self, "Request rejected"),
        }

        let body = ScanResult::failed(self.to_string(), retry_after);
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
