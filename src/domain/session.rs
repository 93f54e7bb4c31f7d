use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::domain::config::ConceptId;
use crate::domain::ids::{ConfigId, MessageId, SessionId};

/// Root aggregate, exclusively owned by its `SessionDurableActor` while live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub config_ref: ConfigId,
    pub student_ref: String,
    pub course_ref: String,
    pub status: SessionStatus,
    pub progress: Progress,
    pub timing: Timing,
    pub conversation: Vec<Message>,
    pub analytics: Analytics,
    pub security: SecurityEnvelope,
    /// One `ConceptState` per concept named in `config.context.concepts`.
    pub concept_states: BTreeMap<ConceptId, ConceptState>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    AwaitingResponse,
    Processing,
    MasteryAchieved,
    MaxAttempts,
    Timeout,
    Completed,
    Error,
}

impl SessionStatus {
    /// Terminal set: `mastery_achieved`, `completed`, `max_attempts`, `timeout`, `error`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::MasteryAchieved | Self::MaxAttempts | Self::Timeout | Self::Completed | Self::Error
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub current_step: u32,
    pub total_steps: u32,
    pub attempt_number: u32,
    pub mastery_achieved: bool,
    pub concepts_mastered: BTreeSet<ConceptId>,
    pub concepts_need_work: BTreeSet<ConceptId>,
    pub overall_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub accumulated_ms: i64,
    pub timeout_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub engagement_score: f64,
    pub struggling_indicators: Vec<String>,
    pub learning_patterns: BTreeMap<String, String>,
}

impl Default for Analytics {
    fn default() -> Self {
        Self {
            engagement_score: 0.5,
            struggling_indicators: Vec::new(),
            learning_patterns: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEnvelope {
    pub session_token: String,
    pub last_validation_at: DateTime<Utc>,
    pub checks: Vec<IntegrityCheck>,
}

/// Child of Session; append-only, never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<MessageMetadata>,
    pub content_hash: String,
    pub integrity: Option<AuthenticityVerdict>,
    /// The exact prompt `PromptBuilder` rendered to produce this message, for
    /// AI-authored roles only (`None` for student messages). `retry_last_ai`
    /// replays this verbatim rather than re-deriving context from scratch,
    /// so a retry is a faithful re-run of the original generation, not a
    /// fresh decision.
    #[serde(default)]
    pub source_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    System,
    Student,
    Question,
    Feedback,
    Hint,
    Encouragement,
    MasteryCheck,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub response_time_ms: Option<u64>,
    pub ai_confidence: Option<f64>,
    pub misconception_detected: Option<bool>,
    pub concepts_addressed: Vec<ConceptId>,
    pub retry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticityVerdict {
    pub risk_score: f64,
    pub action: crate::integrity::IntegrityAction,
}

/// One per concept in `AssessmentConfig.context.concepts`, owned by `Session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptState {
    /// Days; updated after each assessment.
    pub stability: f64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub difficulty_setpoint: f64,
    pub correct_streak: u32,
    pub attempt_count: u32,
    pub status: ConceptStatus,
    /// Last few correct/incorrect outcomes for this concept, most recent
    /// last; feeds `MasteryTracker`'s adaptive-difficulty fuzzy step. Capped
    /// at a small fixed window, not the full attempt history.
    #[serde(default)]
    pub recent_outcomes: std::collections::VecDeque<bool>,
}

impl Default for ConceptState {
    fn default() -> Self {
        Self {
            stability: 1.0,
            last_reviewed_at: None,
            difficulty_setpoint: 0.5,
            correct_streak: 0,
            attempt_count: 0,
            status: ConceptStatus::Unseen,
            recent_outcomes: std::collections::VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConceptStatus {
    Unseen,
    Probed,
    Partial,
    Mastered,
}

/// Append-only, child of Session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub timestamp: DateTime<Utc>,
    pub check_type: IntegrityCheckType,
    pub verdict: IntegrityVerdict,
    pub risk_score: f64,
    pub evidence: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrityCheckType {
    ResponseAuthenticity,
    Timing,
    RateLimit,
    Concurrency,
    Tampering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrityVerdict {
    Pass,
    Warn,
    Fail,
}

impl Session {
    /// Construct a freshly-`created` session for `initialize`. The caller still
    /// owes the welcome message (appended separately) before committing at
    /// version 1 and transitioning to `active`.
    #[must_use]
    pub fn new(
        config: &crate::domain::config::AssessmentConfig,
        student_ref: String,
        course_ref: String,
        session_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            config_ref: config.config_id,
            student_ref,
            course_ref,
            status: SessionStatus::Created,
            progress: Progress {
                current_step: 0,
                total_steps: config.total_steps(),
                attempt_number: 1,
                mastery_achieved: false,
                concepts_mastered: BTreeSet::new(),
                concepts_need_work: BTreeSet::new(),
                overall_score: None,
            },
            timing: Timing {
                started_at: now,
                last_activity_at: now,
                accumulated_ms: 0,
                timeout_at: config.time_limit().map(|d| now + d),
            },
            conversation: Vec::new(),
            analytics: Analytics::default(),
            security: SecurityEnvelope {
                session_token,
                last_validation_at: now,
                checks: Vec::new(),
            },
            concept_states: config
                .context
                .concepts
                .iter()
                .cloned()
                .map(|c| (c, ConceptState::default()))
                .collect(),
            version: 0,
        }
    }

    /// A concept never sits in both the mastered and needs-work sets at once.
    #[must_use]
    pub fn concept_sets_disjoint(&self) -> bool {
        self.progress
            .concepts_mastered
            .is_disjoint(&self.progress.concepts_need_work)
    }

    /// Forces a session whose deadline has passed into the `timeout` status;
    /// terminal statuses are left alone so a past timeout never resurrects a
    /// session that already finished some other way.
    pub fn enforce_timeout(&mut self, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        if let Some(timeout_at) = self.timing.timeout_at {
            if now >= timeout_at {
                self.status = SessionStatus::Timeout;
            }
        }
    }

    #[must_use]
    pub fn student_message_count(&self) -> usize {
        self.conversation
            .iter()
            .filter(|m| m.role == MessageRole::Student)
            .count()
    }
}
