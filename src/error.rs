use thiserror::Error;

/// Structured error hierarchy for the conversational assessment core.
///
/// Each subsystem defines its own error variant group; internal code may
/// still use `anyhow::Result` for ad hoc context chains, but anything that
/// crosses the engine/adapter boundary is mapped into one of the kinds
/// below. The engine never exposes backing-store vocabulary (`sqlx`,
/// `reqwest`) to callers — see `StoreError`/`LlmError`, which wrap the
/// underlying failures as opaque strings.
#[derive(Debug, Error)]
pub enum CacError {
    /// Bad `AssessmentConfig` at `initialize`. Fatal to the call; no state written.
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    /// Unknown session id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Operation not allowed from the session's current status.
    #[error("invalid status for operation: {0}")]
    InvalidStatus(String),

    /// Internal invariant violation. Must never reach a client — a bug.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Optimistic-lock (version CAS) failure; caller retries with a fresh load.
    #[error("optimistic lock conflict on session {0}")]
    Conflict(String),

    /// Session exceeded `timeoutAt`.
    #[error("session {0} timed out")]
    Timeout(String),

    /// `IntegrityEvaluator` emitted `block`; session transitions to `error`.
    #[error("integrity evaluator blocked this response: {0}")]
    IntegrityBlocked(String),

    /// LLM retries exhausted.
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    #[error("prompt: {0}")]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the persistence layer (`store` module).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlx: {0}")]
    Sqlx(String),

    #[error("encode/decode: {0}")]
    Codec(String),

    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: i64, found: i64 },

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Sqlx(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Errors from the LLM client (`llm` module).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Errors from prompt rendering (`prompt` module).
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template render failed: {0}")]
    Render(String),

    #[error("template not found: {0}")]
    NotFound(String),
}

impl From<tera::Error> for PromptError {
    fn from(e: tera::Error) -> Self {
        PromptError::Render(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacError>;
