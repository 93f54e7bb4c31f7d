use serde::{Deserialize, Serialize};

use crate::domain::SessionStatus;
use crate::grade::GradePayload;
use crate::policy::ProgressionDecision;

/// Inbound WebSocket frames. One connection serves exactly one session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Turn {
        student_text: String,
        response_time_ms: Option<u64>,
    },
    RetryLastAi,
    RequestGrade,
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected,
    AiMessage {
        role: String,
        content: String,
    },
    TurnEnd {
        status: SessionStatus,
        decision: String,
    },
    Grade(GradePayload),
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    #[must_use]
    pub fn connected() -> Self {
        Self::Connected
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn turn_end(status: SessionStatus, decision: &ProgressionDecision) -> Self {
        Self::TurnEnd { status, decision: format!("{decision:?}") }
    }

    /// Never panics: every variant here serializes cleanly.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.into())
    }
}
