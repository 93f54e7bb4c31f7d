use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::principal::Principal;
use super::state::AppState;
use crate::domain::config::AssessmentConfig;
use crate::domain::{SessionId, SessionStatus};
use crate::engine::TurnOutcome;
use crate::error::CacError;
use crate::grade::GradePayload;
use crate::store::SessionStore;

/// Maps a domain error onto the HTTP status a client should see. Internal
/// detail never leaks beyond the `Display` string already carried by
/// `CacError`'s variants.
fn status_for(err: &CacError) -> StatusCode {
    match err {
        CacError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
        CacError::NotFound(_) => StatusCode::NOT_FOUND,
        CacError::InvalidStatus(_) | CacError::InvalidTransition(_) => StatusCode::CONFLICT,
        CacError::Conflict(_) => StatusCode::CONFLICT,
        CacError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        CacError::IntegrityBlocked(_) => StatusCode::FORBIDDEN,
        CacError::LlmUnavailable(_) => StatusCode::BAD_GATEWAY,
        CacError::Unauthorized => StatusCode::UNAUTHORIZED,
        CacError::Forbidden(_) => StatusCode::FORBIDDEN,
        CacError::Store(_) | CacError::Llm(_) | CacError::Prompt(_) | CacError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub struct ApiError(pub CacError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(&self.0);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<CacError> for ApiError {
    fn from(e: CacError) -> Self {
        Self(e)
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::from_str(raw).map_err(|_| ApiError(CacError::NotFound(format!("not a session id: {raw}"))))
}

#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    pub config: AssessmentConfig,
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct InitializeResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub welcome_message: Option<String>,
}

pub async fn handle_initialize(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<InitializeRequest>,
) -> Result<Json<InitializeResponse>, ApiError> {
    let session = state
        .engine
        .initialize(&req.config, principal.user_id, principal.course_id, req.session_token, Utc::now())
        .await?;
    state.store.insert(&session).await?;
    state.register_actor(session.id, req.config);

    let welcome_message = session.conversation.first().map(|m| m.content.clone());
    Ok(Json(InitializeResponse { session_id: session.id, status: session.status, welcome_message }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessResponseRequest {
    pub student_text: String,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub status: SessionStatus,
    pub ai_message: Option<String>,
    pub decision: String,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            status: outcome.status,
            ai_message: outcome.ai_message.map(|m| m.content),
            decision: format!("{:?}", outcome.decision),
        }
    }
}

async fn actor_for(state: &AppState, session_id: SessionId) -> Result<crate::actor::SessionHandle, ApiError> {
    state
        .actor_for(session_id)
        .ok_or_else(|| ApiError(CacError::NotFound(format!("no live session {session_id}"))))
}

/// Loads the session and checks the caller is allowed to touch it, per spec
/// §4.9. Called before every per-session operation below.
async fn authorize_session(state: &AppState, principal: &Principal, session_id: SessionId) -> Result<(), ApiError> {
    let session = state.store.load(session_id).await?;
    principal.authorize(&session.student_ref, &session.course_ref)?;
    Ok(())
}

pub async fn handle_process_response(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
    Json(req): Json<ProcessResponseRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    authorize_session(&state, &principal, session_id).await?;
    let handle = actor_for(&state, session_id).await?;
    let outcome = handle.process_response(req.student_text, req.response_time_ms).await?;
    Ok(Json(outcome.into()))
}

pub async fn handle_retry(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    authorize_session(&state, &principal, session_id).await?;
    let handle = actor_for(&state, session_id).await?;
    handle.retry_last_ai().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_grade(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> Result<Json<GradePayload>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    authorize_session(&state, &principal, session_id).await?;
    let handle = actor_for(&state, session_id).await?;
    let payload = handle.calculate_final_grade().await?;
    Ok(Json(payload))
}

pub async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_maps_to_bad_request() {
        assert_eq!(status_for(&CacError::ConfigInvalid("x".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn integrity_blocked_maps_to_forbidden() {
        assert_eq!(status_for(&CacError::IntegrityBlocked("x".into())), StatusCode::FORBIDDEN);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_for(&CacError::NotFound("x".into())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(status_for(&CacError::Conflict("x".into())), StatusCode::CONFLICT);
    }

    #[test]
    fn parse_session_id_rejects_garbage() {
        assert!(parse_session_id("not-a-uuid").is_err());
    }
}
