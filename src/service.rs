//! Process-wide scrape context.
//!
//! Owns the session provider and serializes scans through a single slot:
//! a request is admitted only when no scan is running and the cool-down since
//! the last accepted request has elapsed. Rejected requests are never queued.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use crate::config::ScanConfig;
use crate::scan::{cutoff_for, scan_history, ScanError, ScanReport, ScanResult};
use crate::session::SessionProvider;

/// State guarded by the scan lock
#[derive(Debug, Default)]
struct ScanSlot {
    /// Start of the last accepted request
    last_accepted: Option<Instant>,
}

/// Exclusive right to run one scan. Releases the slot on drop.
pub struct ScanPermit {
    _slot: OwnedMutexGuard<ScanSlot>,
}

/// Why a request was not admitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("A scan is already in progress, please wait")]
    Busy { retry_after_seconds: u64 },

    #[error("Please wait {retry_after_seconds} seconds between requests")]
    CoolingDown { retry_after_seconds: u64 },
}

/// Whole seconds a client should wait, rounded up so a retry is never early
pub fn retry_after_seconds(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// A validated scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Normalized group identifier
    pub identifier: String,
    pub message_limit: NonZeroU64,
    /// Window in hours; `None` or 0 scans without a time bound
    pub time_limit_hours: Option<u64>,
}

/// Shared scrape service, cloneable across handlers.
#[derive(Clone)]
pub struct ScrapeService {
    provider: Arc<dyn SessionProvider>,
    slot: Arc<Mutex<ScanSlot>>,
    cooldown: Duration,
    default_limit: NonZeroU64,
    max_limit: NonZeroU64,
}

impl ScrapeService {
    pub fn new(provider: Arc<dyn SessionProvider>, config: &ScanConfig) -> Self {
        // Zero limits are rejected when the config is loaded
        let max_limit = NonZeroU64::new(config.max_message_limit).unwrap_or(NonZeroU64::MIN);
        let default_limit = NonZeroU64::new(config.default_message_limit)
            .unwrap_or(max_limit)
            .min(max_limit);

        Self {
            provider,
            slot: Arc::new(Mutex::new(ScanSlot::default())),
            cooldown: Duration::from_secs(config.cooldown_seconds),
            default_limit,
            max_limit,
        }
    }

    /// Message limit for a request: the default when absent, clamped to the
    /// maximum, `None` when the request asked for zero.
    pub fn resolve_limit(&self, requested: Option<u64>) -> Option<NonZeroU64> {
        match requested {
            None => Some(self.default_limit),
            Some(n) => NonZeroU64::new(n).map(|n| n.min(self.max_limit)),
        }
    }

    /// Try to claim the scan slot without waiting.
    pub fn admit(&self) -> Result<ScanPermit, AdmissionError> {
        let mut slot = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| AdmissionError::Busy {
                // The running scan's own cool-down is the earliest a retry can pass
                retry_after_seconds: retry_after_seconds(self.cooldown).max(1),
            })?;

        if let Some(last) = slot.last_accepted {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                return Err(AdmissionError::CoolingDown {
                    retry_after_seconds: retry_after_seconds(self.cooldown - elapsed),
                });
            }
        }

        slot.last_accepted = Some(Instant::now());
        Ok(ScanPermit { _slot: slot })
    }

    /// Run a full scan under `permit`. Never fails: every error becomes a
    /// failure result. The session is disconnected whatever the outcome.
    #[instrument(
        name = "scrape::run",
        skip(self, _permit, request),
        fields(group = %request.identifier, limit = request.message_limit.get())
    )]
    pub async fn run(&self, _permit: ScanPermit, request: ScanRequest) -> ScanResult {
        tracing::info!(
            time_limit_hours = ?request.time_limit_hours,
            "Fetching message history"
        );

        let outcome = self.scan(&request).await;
        self.provider.disconnect().await;

        match &outcome {
            Ok(report) => tracing::info!(
                title = %report.group_title,
                usernames = report.total_count(),
                messages_scanned = report.messages_scanned,
                "Scraped usernames from message history"
            ),
            Err(err @ ScanError::RateLimited { .. }) => {
                tracing::warn!(error = %err, "Scan throttled by remote service")
            }
            Err(err) => tracing::error!(error = %err, "Scan failed"),
        }

        ScanResult::from(outcome)
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanReport, ScanError> {
        self.provider.authorize().await?;
        tracing::debug!("Session authorized");

        let entity = self.provider.resolve_entity(&request.identifier).await?;
        let messages = self
            .provider
            .open_messages(&entity, request.message_limit.get())
            .await?;

        let cutoff = cutoff_for(Utc::now(), request.time_limit_hours);
        scan_history(&entity, messages, request.message_limit, cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Entity, MessageRecord, MessageStream, SenderRef, SessionError};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider replaying a fixed history, or failing at a chosen stage
    #[derive(Default)]
    struct ScriptedProvider {
        authorize_error: Option<SessionError>,
        resolve_error: Option<SessionError>,
        messages: Vec<Result<MessageRecord, SessionError>>,
        requested_max: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl SessionProvider for ScriptedProvider {
        async fn authorize(&self) -> Result<(), SessionError> {
            self.authorize_error.clone().map_or(Ok(()), Err)
        }

        async fn resolve_entity(&self, identifier: &str) -> Result<Entity, SessionError> {
            if let Some(err) = self.resolve_error.clone() {
                return Err(err);
            }
            Ok(Entity {
                id: 1,
                title: format!("Group {}", identifier),
            })
        }

        async fn open_messages(
            &self,
            _entity: &Entity,
            max_count: u64,
        ) -> Result<MessageStream, SessionError> {
            self.requested_max
                .store(max_count as usize, Ordering::SeqCst);
            Ok(futures::stream::iter(self.messages.clone()).boxed())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(cooldown_seconds: u64) -> ScanConfig {
        ScanConfig {
            default_message_limit: 50,
            max_message_limit: 100,
            cooldown_seconds,
        }
    }

    fn request(limit: u64) -> ScanRequest {
        ScanRequest {
            identifier: "testgroup".to_string(),
            message_limit: NonZeroU64::new(limit).unwrap(),
            time_limit_hours: None,
        }
    }

    fn from(id: i64, username: &str) -> Result<MessageRecord, SessionError> {
        Ok(MessageRecord {
            id,
            sender: Some(SenderRef {
                id,
                username: Some(username.to_string()),
                ..Default::default()
            }),
            date: Some(Utc::now()),
        })
    }

    #[test]
    fn test_resolve_limit_policy() {
        let service = ScrapeService::new(Arc::new(ScriptedProvider::default()), &config(0));
        assert_eq!(service.resolve_limit(None).map(NonZeroU64::get), Some(50));
        assert_eq!(service.resolve_limit(Some(70)).map(NonZeroU64::get), Some(70));
        assert_eq!(service.resolve_limit(Some(500)).map(NonZeroU64::get), Some(100));
        assert_eq!(service.resolve_limit(Some(0)), None);
    }

    #[test]
    fn test_admit_rejects_while_scan_in_progress() {
        let service = ScrapeService::new(Arc::new(ScriptedProvider::default()), &config(0));
        let permit = service.admit().unwrap();
        assert!(matches!(service.admit(), Err(AdmissionError::Busy { .. })));
        drop(permit);
        assert!(service.admit().is_ok());
    }

    #[test]
    fn test_busy_suggests_retry_after_cooldown() {
        let service = ScrapeService::new(Arc::new(ScriptedProvider::default()), &config(30));
        let _permit = service.admit().unwrap();
        assert_eq!(
            service.admit().err(),
            Some(AdmissionError::Busy {
                retry_after_seconds: 30
            })
        );

        let service = ScrapeService::new(Arc::new(ScriptedProvider::default()), &config(0));
        let _permit = service.admit().unwrap();
        assert_eq!(
            service.admit().err(),
            Some(AdmissionError::Busy {
                retry_after_seconds: 1
            })
        );
    }

    #[test]
    fn test_admit_enforces_cooldown() {
        let service = ScrapeService::new(Arc::new(ScriptedProvider::default()), &config(60));
        drop(service.admit().unwrap());
        match service.admit() {
            Err(AdmissionError::CoolingDown {
                retry_after_seconds,
            }) => {
                assert!(retry_after_seconds <= 60);
                assert!(retry_after_seconds > 50);
            }
            Err(other) => panic!("expected cool-down, got {:?}", other),
            Ok(_) => panic!("expected cool-down, got a permit"),
        }
    }

    #[test]
    fn test_retry_after_seconds_rounds_up() {
        assert_eq!(retry_after_seconds(Duration::from_millis(9_001)), 10);
        assert_eq!(retry_after_seconds(Duration::from_secs(3)), 3);
        let err = AdmissionError::CoolingDown {
            retry_after_seconds: 5,
        };
        assert_eq!(err.to_string(), "Please wait 5 seconds between requests");
    }

    #[tokio::test]
    async fn test_run_success_and_disconnects() {
        let provider = Arc::new(ScriptedProvider {
            messages: vec![from(3, "Bob"), from(2, "amy"), from(1, "bob")],
            ..Default::default()
        });
        let service = ScrapeService::new(provider.clone(), &config(0));

        let result = service.run(service.admit().unwrap(), request(10)).await;

        assert!(result.success);
        assert_eq!(result.group_title.as_deref(), Some("Group testgroup"));
        assert_eq!(result.total_count, Some(2));
        assert_eq!(result.messages_scanned, Some(3));
        assert_eq!(provider.requested_max.load(Ordering::SeqCst), 10);
        assert_eq!(provider.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_authorization_failure() {
        let provider = Arc::new(ScriptedProvider {
            authorize_error: Some(SessionError::AuthenticationRequired),
            ..Default::default()
        });
        let service = ScrapeService::new(provider.clone(), &config(0));

        let result = service.run(service.admit().unwrap(), request(10)).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Failed to authorize Telegram client")
        );
        assert_eq!(provider.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_private_group() {
        let provider = Arc::new(ScriptedProvider {
            resolve_error: Some(SessionError::AccessDenied("testgroup".to_string())),
            ..Default::default()
        });
        let service = ScrapeService::new(provider, &config(0));

        let result = service.run(service.admit().unwrap(), request(10)).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Group 'testgroup' was not found or is private")
        );
    }

    #[tokio::test]
    async fn test_run_rate_limited_surfaces_wait() {
        let provider = Arc::new(ScriptedProvider {
            resolve_error: Some(SessionError::RateLimited { wait_seconds: 120 }),
            ..Default::default()
        });
        let service = ScrapeService::new(provider, &config(0));

        let result = service.run(service.admit().unwrap(), request(10)).await;
        assert!(!result.success);
        assert_eq!(result.retry_after_seconds, Some(120));
    }

    #[tokio::test]
    async fn test_run_mid_scan_error_returns_no_partial_data() {
        let provider = Arc::new(ScriptedProvider {
            messages: vec![
                from(3, "bob"),
                Err(SessionError::Transport("timeout".to_string())),
            ],
            ..Default::default()
        });
        let service = ScrapeService::new(provider.clone(), &config(0));

        let result = service.run(service.admit().unwrap(), request(10)).await;
        assert!(!result.success);
        assert!(result.usernames.is_none());
        assert_eq!(result.error.as_deref(), Some("Scan failed: timeout"));
        assert_eq!(provider.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_releases_slot_when_done() {
        let provider = Arc::new(ScriptedProvider::default());
        let service = ScrapeService::new(provider, &config(0));

        service.run(service.admit().unwrap(), request(10)).await;
        assert!(service.admit().is_ok());
    }
}
