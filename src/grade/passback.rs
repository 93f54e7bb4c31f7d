use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use super::GradePayload;
use crate::domain::SessionId;

#[derive(Debug, Error)]
pub enum PassbackError {
    #[error("passback request failed: {0}")]
    Request(String),
}

/// Delivery state of a `GradeCalculation.passback`, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PassbackStatus {
    Pending,
    Sent,
    Acked,
    Failed,
    Skipped,
}

/// Delivers a finished grade to the surrounding LMS. The real integration
/// (LTI Assignment and Grade Services) lives outside this crate; this seam
/// only has to guarantee the payload it computed reaches *something*.
#[async_trait]
pub trait PassbackClient: Send + Sync {
    async fn send(&self, session_id: SessionId, payload: &GradePayload) -> Result<(), PassbackError>;
}

/// Logs the grade instead of calling out to an LMS. Used wherever passback
/// is disabled in `AssessmentConfig.grading.passback_enabled`, and in tests.
pub struct LoggingPassbackClient;

#[async_trait]
impl PassbackClient for LoggingPassbackClient {
    async fn send(&self, session_id: SessionId, payload: &GradePayload) -> Result<(), PassbackError> {
        tracing::info!(
            %session_id,
            points_awarded = payload.points_awarded,
            points_possible = payload.points_possible,
            "grade passback (logging only)"
        );
        Ok(())
    }
}
