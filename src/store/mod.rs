//! Session persistence behind a small trait, so the engine and actor never
//! see `sqlx` directly. [`SqliteSessionStore`] is the only implementation;
//! its `save` enforces optimistic concurrency via a version column.

mod schema;
mod sqlite;

pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Session, SessionId};
use crate::error::Result;

/// Non-critical telemetry appended outside the session's version CAS — the
/// caller doesn't need to block a turn on it reaching durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: String,
    pub detail: serde_json::Value,
}

impl AuditEntry {
    #[must_use]
    pub fn new(event: impl Into<String>, detail: serde_json::Value) -> Self {
        Self { event: event.into(), detail }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<()>;

    async fn load(&self, session_id: SessionId) -> Result<Session>;

    /// Fails with `CacError::Store(StoreError::VersionConflict { .. })` if
    /// the stored row's version no longer matches `expected_version`.
    async fn save(&self, session: &Session, expected_version: i64) -> Result<()>;

    /// Outside the CAS; used for non-critical telemetry.
    async fn append_audit(&self, session_id: SessionId, entry: AuditEntry) -> Result<()>;

    /// Permanently removes a session's envelope. Writes a prior audit entry
    /// recording `actor` before deleting.
    async fn delete(&self, session_id: SessionId, actor: &str) -> Result<()>;
}
