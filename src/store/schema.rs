use sqlx::SqlitePool;

use crate::error::{Result, StoreError};

const CREATE_SESSIONS: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id   TEXT PRIMARY KEY,
    student_ref  TEXT NOT NULL,
    course_ref   TEXT NOT NULL,
    status       TEXT NOT NULL,
    version      INTEGER NOT NULL,
    body         TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_student ON sessions(student_ref);
CREATE INDEX IF NOT EXISTS idx_sessions_course ON sessions(course_ref);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
";

/// Non-critical telemetry, written outside the session's version CAS.
/// `id` is the monotonic discriminator spec §6 calls for.
const CREATE_AUDIT_LOG: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL,
    event        TEXT NOT NULL,
    detail       TEXT NOT NULL,
    recorded_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_log_session ON audit_log(session_id);
";

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
";

/// Idempotent; safe to run on every pool acquisition.
pub(super) async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(PRAGMAS)
        .execute(pool)
        .await
        .map_err(StoreError::from)?;

    sqlx::raw_sql(CREATE_SESSIONS)
        .execute(pool)
        .await
        .map_err(StoreError::from)?;

    sqlx::raw_sql(CREATE_AUDIT_LOG)
        .execute(pool)
        .await
        .map_err(StoreError::from)?;

    Ok(())
}
