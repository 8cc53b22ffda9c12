//! Session provider interface for the remote messaging service.
//!
//! A provider authorizes a session, resolves a group identifier to an
//! [`Entity`], and yields that entity's history as a newest-first stream of
//! [`MessageRecord`]s. The scan pipeline only talks to this trait, so a live
//! MTProto client and the on-disk [`ArchiveSession`] are interchangeable.
//!
//! Key re-exports:
//! - [`ArchiveSession`] - Provider backed by a directory of archived histories

mod archive;

pub use archive::ArchiveSession;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Resolved group or channel handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub title: String,
}

/// Identity attached to a message.
///
/// Every field other than `id` is optional on the platform; absence is
/// represented as `None`, never as a missing attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRef {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl SenderRef {
    /// Username if present and non-empty
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|name| !name.is_empty())
    }
}

/// A single message from a group's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    /// `None` for service messages (joins, pins, title changes)
    #[serde(default)]
    pub sender: Option<SenderRef>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Newest-first message stream for one entity. Single pass.
pub type MessageStream = BoxStream<'static, Result<MessageRecord, SessionError>>;

/// Failure signals raised by a session provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session is not authorized")]
    AuthenticationRequired,

    #[error("Authorization failed: {0}")]
    AuthenticationFailed(String),

    #[error("No group or channel named {0}")]
    NotFound(String),

    #[error("Not a member of private group {0}")]
    AccessDenied(String),

    #[error("Rate limited, retry in {wait_seconds} seconds")]
    RateLimited { wait_seconds: u64 },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Connection to the remote messaging service.
///
/// Callers drive one scan at a time: `authorize`, `resolve_entity`,
/// `open_messages`, then `disconnect` whatever the outcome.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Establish and authorize the session.
    async fn authorize(&self) -> Result<(), SessionError>;

    /// Resolve a normalized group identifier.
    async fn resolve_entity(&self, identifier: &str) -> Result<Entity, SessionError>;

    /// Open the entity's history, newest message first, yielding at most `max_count` records.
    async fn open_messages(
        &self,
        entity: &Entity,
        max_count: u64,
    ) -> Result<MessageStream, SessionError>;

    /// Tear the session down. Errors are logged by the provider, not returned.
    async fn disconnect(&self);
}
