use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::schema::init_schema;
use super::{AuditEntry, SessionStore};
use crate::domain::{Session, SessionId};
use crate::error::{CacError, Result, StoreError};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Connects and runs schema initialization. `url` is a `sqlx` SQLite
    /// connection string, e.g. `sqlite://cac.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await.map_err(StoreError::from)?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        let body = serde_json::to_string(session).map_err(StoreError::from)?;
        sqlx::query(
            "INSERT INTO sessions (session_id, student_ref, course_ref, status, version, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(session.id.to_string())
        .bind(&session.student_ref)
        .bind(&session.course_ref)
        .bind(session.status.to_string())
        .bind(session.version)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn load(&self, session_id: SessionId) -> Result<Session> {
        let row: (String,) = sqlx::query_as("SELECT body FROM sessions WHERE session_id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        serde_json::from_str(&row.0).map_err(|e| CacError::Store(StoreError::from(e)))
    }

    /// Optimistic-concurrency save: the write only lands if `expected_version`
    /// still matches the stored row's version, otherwise the caller gets a
    /// conflict to retry against a freshly-loaded session.
    async fn save(&self, session: &Session, expected_version: i64) -> Result<()> {
        let body = serde_json::to_string(session).map_err(StoreError::from)?;
        let result = sqlx::query(
            "UPDATE sessions SET status = ?1, version = ?2, body = ?3, updated_at = ?4
             WHERE session_id = ?5 AND version = ?6",
        )
        .bind(session.status.to_string())
        .bind(session.version)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .bind(session.id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            let current = self.load(session.id).await?;
            return Err(CacError::Store(StoreError::VersionConflict {
                expected: expected_version,
                found: current.version,
            }));
        }
        Ok(())
    }

    async fn append_audit(&self, session_id: SessionId, entry: AuditEntry) -> Result<()> {
        let detail = serde_json::to_string(&entry.detail).map_err(StoreError::from)?;
        sqlx::query(
            "INSERT INTO audit_log (session_id, event, detail, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id.to_string())
        .bind(&entry.event)
        .bind(detail)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    /// Writes the deletion audit entry first, per spec §4.7: "the core only
    /// provides delete(sessionId, actor) with a prior audit write."
    async fn delete(&self, session_id: SessionId, actor: &str) -> Result<()> {
        self.append_audit(
            session_id,
            AuditEntry::new("session_deleted", serde_json::json!({ "actor": actor })),
        )
        .await?;

        sqlx::query("DELETE FROM sessions WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::fixtures::config;

    async fn store() -> SqliteSessionStore {
        SqliteSessionStore::connect("sqlite::memory:").await.unwrap()
    }

    fn fresh_session() -> Session {
        let cfg = config(&["A"], 0.75, 5);
        Session::new(&cfg, "student-1".into(), "course-1".into(), "tok".into(), Utc::now())
    }

    #[tokio::test]
    async fn insert_then_load_round_trips() {
        let store = store().await;
        let session = fresh_session();
        store.insert(&session).await.unwrap();
        let loaded = store.load(session.id).await.unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.student_ref, session.student_ref);
    }

    #[tokio::test]
    async fn load_missing_session_returns_not_found() {
        let store = store().await;
        let err = store.load(SessionId::new()).await.unwrap_err();
        assert!(matches!(err, CacError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn save_with_stale_version_conflicts() {
        let store = store().await;
        let mut session = fresh_session();
        store.insert(&session).await.unwrap();

        session.version = 1;
        store.save(&session, 0).await.unwrap();

        session.version = 2;
        let err = store.save(&session, 0).await.unwrap_err();
        assert!(matches!(err, CacError::Store(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn save_with_matching_version_succeeds() {
        let store = store().await;
        let mut session = fresh_session();
        store.insert(&session).await.unwrap();

        session.version = 1;
        store.save(&session, 0).await.unwrap();

        let loaded = store.load(session.id).await.unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn append_audit_does_not_touch_the_session_row() {
        let store = store().await;
        let session = fresh_session();
        store.insert(&session).await.unwrap();

        store
            .append_audit(session.id, AuditEntry::new("note", serde_json::json!({"k": "v"})))
            .await
            .unwrap();

        let loaded = store.load(session.id).await.unwrap();
        assert_eq!(loaded.version, session.version);
    }

    #[tokio::test]
    async fn delete_removes_the_session_and_leaves_an_audit_trail() {
        let store = store().await;
        let session = fresh_session();
        store.insert(&session).await.unwrap();

        store.delete(session.id, "instructor-1").await.unwrap();

        let err = store.load(session.id).await.unwrap_err();
        assert!(matches!(err, CacError::Store(StoreError::NotFound(_))));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE session_id = ?1")
            .bind(session.id.to_string())
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
