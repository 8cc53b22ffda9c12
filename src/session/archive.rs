//! Session provider backed by archived group histories on disk.
//!
//! Each group lives in `<dir>/<identifier>.json`:
//!
//! ```json
//! {
//!   "id": 1001,
//!   "title": "Test Group",
//!   "private": false,
//!   "member": true,
//!   "messages": [
//!     { "id": 2, "date": "2024-05-01T12:00:00Z",
//!       "sender": { "id": 7, "username": "Bob", "first_name": "Bob" } },
//!     { "id": 1 }
//!   ]
//! }
//! ```
//!
//! Messages are served by descending id, which is newest first on Telegram.
//! An optional `flood_wait_seconds` makes resolution fail the way a throttled
//! server does.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{Entity, MessageRecord, MessageStream, SessionError, SessionProvider};

/// On-disk layout of one archived group
#[derive(Debug, Deserialize)]
struct ArchivedGroup {
    #[serde(default)]
    id: i64,
    title: String,
    #[serde(default)]
    private: bool,
    #[serde(default = "ArchivedGroup::default_member")]
    member: bool,
    #[serde(default)]
    flood_wait_seconds: Option<u64>,
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

impl ArchivedGroup {
    fn default_member() -> bool {
        true
    }
}

/// Provider reading group histories from a directory of JSON files.
pub struct ArchiveSession {
    dir: PathBuf,
    /// Group resolved in the current session, keyed by entity id
    resolved: Mutex<Option<(i64, Vec<MessageRecord>)>>,
}

impl ArchiveSession {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            resolved: Mutex::new(None),
        }
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Identifiers are usernames: ASCII letters, digits and underscores.
    /// Anything else (invite hashes, paths) cannot name an archive file.
    fn is_valid_identifier(identifier: &str) -> bool {
        !identifier.is_empty()
            && identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn group_path(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", identifier.to_ascii_lowercase()))
    }
}

#[async_trait]
impl SessionProvider for ArchiveSession {
    async fn authorize(&self) -> Result<(), SessionError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => {
                tracing::debug!(dir = %self.dir.display(), "Archive session authorized");
                Ok(())
            }
            Ok(_) => Err(SessionError::AuthenticationFailed(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SessionError::AuthenticationRequired)
            }
            Err(e) => Err(SessionError::AuthenticationFailed(e.to_string())),
        }
    }

    async fn resolve_entity(&self, identifier: &str) -> Result<Entity, SessionError> {
        if !Self::is_valid_identifier(identifier) {
            return Err(SessionError::NotFound(identifier.to_string()));
        }

        let path = self.group_path(identifier);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(identifier.to_string()));
            }
            Err(e) => {
                return Err(SessionError::Transport(format!("{}: {}", path.display(), e)));
            }
        };

        let group: ArchivedGroup = serde_json::from_str(&contents)
            .map_err(|e| SessionError::Transport(format!("{}: {}", path.display(), e)))?;

        if let Some(wait_seconds) = group.flood_wait_seconds {
            return Err(SessionError::RateLimited { wait_seconds });
        }
        if group.private && !group.member {
            return Err(SessionError::AccessDenied(identifier.to_string()));
        }

        tracing::debug!(
            %identifier,
            title = %group.title,
            messages = group.messages.len(),
            "Resolved archived group"
        );

        let entity = Entity {
            id: group.id,
            title: group.title,
        };
        *self.resolved.lock().await = Some((entity.id, group.messages));
        Ok(entity)
    }

    async fn open_messages(
        &self,
        entity: &Entity,
        max_count: u64,
    ) -> Result<MessageStream, SessionError> {
        let mut messages = match self.resolved.lock().await.take() {
            Some((id, messages)) if id == entity.id => messages,
            _ => {
                return Err(SessionError::Transport(format!(
                    "entity {} was not resolved in this session",
                    entity.id
                )));
            }
        };

        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(usize::try_from(max_count).unwrap_or(usize::MAX));

        Ok(futures::stream::iter(messages.into_iter().map(Ok)).boxed())
    }

    async fn disconnect(&self) {
        self.resolved.lock().await.take();
        tracing::debug!("Archive session closed");
    }
}
