//! History scanning: drives a session's message stream through the
//! [`HistoryAggregator`] and shapes the outcome for callers.
//!
//! The stream is pulled one message at a time and never past the message
//! limit. Any stream error aborts the scan and discards the partial tally.
//!
//! Key re-exports:
//! - [`scan_history`] - One bounded pass over an entity's history
//! - [`normalize_group_identifier`] - Canonical identifier from user input
//! - [`ScanResult`] - Serialized success or failure returned to clients

mod aggregator;
mod identifier;

pub use aggregator::{HistoryAggregator, SenderRecord, Step};
pub use identifier::normalize_group_identifier;

use std::num::NonZeroU64;

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use serde::Serialize;
use tracing::instrument;

use crate::config::SCAN_PROGRESS_INTERVAL;
use crate::session::{Entity, MessageStream, SessionError};

/// Reasons a scan could not produce a report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to authorize Telegram client")]
    AuthenticationRequired,

    #[error("Failed to authorize Telegram client: {0}")]
    AuthenticationFailed(String),

    #[error("Group '{0}' was not found or is private")]
    EntityNotFoundOrPrivate(String),

    #[error("Telegram is rate limiting requests, try again in {wait_seconds} seconds")]
    RateLimited { wait_seconds: u64 },

    #[error("Scan failed: {0}")]
    Transient(String),
}

impl ScanError {
    /// Wait time the caller should honor before retrying, if any
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ScanError::RateLimited { wait_seconds } => Some(*wait_seconds),
            _ => None,
        }
    }
}

impl From<SessionError> for ScanError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AuthenticationRequired => ScanError::AuthenticationRequired,
            SessionError::AuthenticationFailed(reason) => ScanError::AuthenticationFailed(reason),
            SessionError::NotFound(identifier) | SessionError::AccessDenied(identifier) => {
                ScanError::EntityNotFoundOrPrivate(identifier)
            }
            SessionError::RateLimited { wait_seconds } => ScanError::RateLimited { wait_seconds },
            SessionError::Transport(reason) => ScanError::Transient(reason),
        }
    }
}

/// Output of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub group_title: String,
    /// Most active first
    pub senders: Vec<SenderRecord>,
    pub messages_scanned: u64,
}

impl ScanReport {
    pub fn total_count(&self) -> usize {
        self.senders.len()
    }
}

/// Scan outcome as returned to clients.
///
/// Success carries the report fields, failure carries only `error` and, when
/// the failure names a wait time, `retry_after_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usernames: Option<Vec<SenderRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_scanned: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ScanResult {
    pub fn completed(report: ScanReport) -> Self {
        Self {
            success: true,
            total_count: Some(report.total_count()),
            group_title: Some(report.group_title),
            usernames: Some(report.senders),
            messages_scanned: Some(report.messages_scanned),
            error: None,
            retry_after_seconds: None,
        }
    }

    pub fn failed(error: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self {
            success: false,
            group_title: None,
            usernames: None,
            total_count: None,
            messages_scanned: None,
            error: Some(error.into()),
            retry_after_seconds,
        }
    }
}

impl From<Result<ScanReport, ScanError>> for ScanResult {
    fn from(outcome: Result<ScanReport, ScanError>) -> Self {
        match outcome {
            Ok(report) => ScanResult::completed(report),
            Err(err) => ScanResult::failed(err.to_string(), err.retry_after_seconds()),
        }
    }
}

/// Oldest instant a counted message may carry for a window of `hours`.
///
/// `None` or `0` means no time bound, as does a window reaching past the
/// representable range.
pub fn cutoff_for(now: DateTime<Utc>, hours: Option<u64>) -> Option<DateTime<Utc>> {
    let hours = i64::try_from(hours.filter(|&h| h > 0)?).ok()?;
    now.checked_sub_signed(TimeDelta::try_hours(hours)?)
}

/// Scan an entity's newest-first history.
///
/// Pulls at most `message_limit` messages and stops at the first message
/// dated before `cutoff`.
#[instrument(
    name = "scan::history",
    skip(entity, messages),
    fields(group = %entity.title, messages_scanned, unique_senders)
)]
pub async fn scan_history(
    entity: &Entity,
    mut messages: MessageStream,
    message_limit: NonZeroU64,
    cutoff: Option<DateTime<Utc>>,
) -> Result<ScanReport, ScanError> {
    let mut aggregator = HistoryAggregator::new(message_limit, cutoff);

    while aggregator.wants_more() {
        let Some(message) = messages.next().await else {
            break;
        };
        let step = aggregator.observe(&message?);

        if aggregator.messages_scanned() % SCAN_PROGRESS_INTERVAL == 0 {
            tracing::info!(
                scanned = aggregator.messages_scanned(),
                unique_senders = aggregator.unique_senders(),
                "Scan progress"
            );
        }

        if step == Step::Stop {
            tracing::debug!(
                scanned = aggregator.messages_scanned(),
                "Reached time window cutoff"
            );
            break;
        }
    }

    let messages_scanned = aggregator.messages_scanned();
    let senders = aggregator.finish();

    let span = tracing::Span::current();
    span.record("messages_scanned", messages_scanned);
    span.record("unique_senders", senders.len());
    tracing::info!(
        messages_scanned,
        unique_senders = senders.len(),
        "Scan complete"
    );

    Ok(ScanReport {
        group_title: entity.title.clone(),
        senders,
        messages_scanned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MessageRecord, SenderRef};
    use chrono::TimeZone;

    fn entity() -> Entity {
        Entity {
            id: 1,
            title: "Test Group".to_string(),
        }
    }

    fn limit(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn msg(id: i64, username: &str) -> MessageRecord {
        MessageRecord {
            id,
            sender: Some(SenderRef {
                id,
                username: Some(username.to_string()),
                ..Default::default()
            }),
            date: None,
        }
    }

    fn stream_of(items: Vec<Result<MessageRecord, SessionError>>) -> MessageStream {
        futures::stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_scan_collects_report() {
        let messages = stream_of(vec![Ok(msg(3, "Bob")), Ok(msg(2, "amy")), Ok(msg(1, "bob"))]);
        let report = scan_history(&entity(), messages, limit(10), None)
            .await
            .unwrap();

        assert_eq!(report.group_title, "Test Group");
        assert_eq!(report.messages_scanned, 3);
        assert_eq!(report.total_count(), 2);
        assert_eq!(report.senders[0].username_key, "bob");
        assert_eq!(report.senders[0].message_count, 2);
    }

    #[tokio::test]
    async fn test_stream_error_discards_partial_tally() {
        let messages = stream_of(vec![
            Ok(msg(3, "bob")),
            Ok(msg(2, "amy")),
            Err(SessionError::Transport("connection reset".to_string())),
            Ok(msg(1, "cid")),
        ]);
        let err = scan_history(&entity(), messages, limit(10), None)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::Transient("connection reset".to_string()));

        let result = ScanResult::from(Err::<ScanReport, _>(err));
        assert!(!result.success);
        assert!(result.usernames.is_none());
        assert!(result.total_count.is_none());
    }

    #[tokio::test]
    async fn test_limit_prevents_pulling_past_bound() {
        // The error sits past the limit, so it is never pulled
        let messages = stream_of(vec![
            Ok(msg(2, "bob")),
            Ok(msg(1, "amy")),
            Err(SessionError::Transport("unreachable".to_string())),
        ]);
        let report = scan_history(&entity(), messages, limit(2), None)
            .await
            .unwrap();
        assert_eq!(report.messages_scanned, 2);
    }

    #[tokio::test]
    async fn test_cutoff_stops_stream() {
        let day = |hour| Some(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap());
        let mut recent = msg(3, "bob");
        recent.date = day(12);
        let mut old = msg(2, "amy");
        old.date = day(6);
        let messages = stream_of(vec![
            Ok(recent),
            Ok(old),
            Err(SessionError::Transport("never pulled".to_string())),
        ]);

        let report = scan_history(&entity(), messages, limit(10), day(9))
            .await
            .unwrap();
        assert_eq!(report.messages_scanned, 2);
        assert_eq!(report.total_count(), 1);
        assert_eq!(report.senders[0].username_key, "bob");
    }

    #[tokio::test]
    async fn test_empty_history() {
        let report = scan_history(&entity(), stream_of(vec![]), limit(10), None)
            .await
            .unwrap();
        assert_eq!(report.messages_scanned, 0);
        assert!(report.senders.is_empty());
    }

    #[test]
    fn test_cutoff_for_hours() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            cutoff_for(now, Some(3)),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_cutoff_for_zero_or_absent_is_unbounded() {
        let now = Utc::now();
        assert_eq!(cutoff_for(now, None), None);
        assert_eq!(cutoff_for(now, Some(0)), None);
    }

    #[test]
    fn test_cutoff_for_huge_window_is_unbounded() {
        assert_eq!(cutoff_for(Utc::now(), Some(u64::MAX)), None);
    }

    #[test]
    fn test_session_errors_map_to_scan_taxonomy() {
        assert_eq!(
            ScanError::from(SessionError::AccessDenied("club".to_string())),
            ScanError::EntityNotFoundOrPrivate("club".to_string())
        );
        assert_eq!(
            ScanError::from(SessionError::NotFound("nope".to_string())),
            ScanError::EntityNotFoundOrPrivate("nope".to_string())
        );
        assert_eq!(
            ScanError::from(SessionError::AuthenticationRequired),
            ScanError::AuthenticationRequired
        );
    }

    #[test]
    fn test_rate_limited_result_carries_wait() {
        let err = ScanError::RateLimited { wait_seconds: 17 };
        let result = ScanResult::from(Err::<ScanReport, _>(err));
        assert_eq!(result.retry_after_seconds, Some(17));
        assert_eq!(
            result.error.as_deref(),
            Some("Telegram is rate limiting requests, try again in 17 seconds")
        );
    }

    #[test]
    fn test_failed_result_serializes_without_report_fields() {
        let json = serde_json::to_value(ScanResult::failed("boom", None)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "error": "boom" }));
    }

    #[test]
    fn test_completed_result_serializes_report_fields() {
        let report = ScanReport {
            group_title: "G".to_string(),
            senders: vec![],
            messages_scanned: 4,
        };
        let json = serde_json::to_value(ScanResult::completed(report)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "group_title": "G",
                "usernames": [],
                "total_count": 0,
                "messages_scanned": 4
            })
        );
    }
}
