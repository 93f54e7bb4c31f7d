//! Final grade calculation and LMS passback. `GradeCalculator` is a pure
//! function of a finished session; `PassbackClient` is the seam for
//! delivering it, with a logging stub standing in for the real LMS call.

mod passback;

pub use passback::{LoggingPassbackClient, PassbackClient, PassbackError, PassbackStatus};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::domain::config::AssessmentConfig;
use crate::domain::session::{ConceptStatus, Session, SessionStatus};

/// LTI Assignment-and-Grade-Services `activityProgress`, per spec §6. Only
/// the values a terminal session can actually reach are reachable here:
/// launch-time states like `Initialized`/`Started` belong to the (out of
/// scope) launch handshake, not a finished assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum ActivityProgress {
    Completed,
    Submitted,
    Initialized,
}

/// LTI `gradingProgress`, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum GradingProgress {
    FullyGraded,
    Failed,
}

/// The produced payload of spec §6's "Gradebook passback (produced)"
/// interface, plus the component breakdown §4.1's `GradeCalculation` needs
/// for the rationale text. Transport (OAuth, the actual HTTP call) is the
/// injected `PassbackClient`'s job; this struct is only ever assembled here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradePayload {
    pub points_awarded: f64,
    pub points_possible: f64,
    pub mastery_component: f64,
    pub participation_component: f64,
    pub improvement_component: f64,
    pub rationale: String,
    pub student_ref: String,
    /// The gradebook line item to post to. `None` here because `AssessmentConfig`
    /// (per spec §3) carries no LMS line-item identifier; the out-of-scope
    /// passback transport is expected to resolve one from `student_ref`/`config_id`.
    pub line_item_ref: Option<String>,
    pub activity_progress: ActivityProgress,
    pub grading_progress: GradingProgress,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub passback_eligible: bool,
    pub passback_status: PassbackStatus,
}

pub struct GradeCalculator;

impl GradeCalculator {
    /// Weighted blend of mastery, participation, and improvement, scaled to
    /// `config.grading.points_possible`. `rationale` is filled in by the
    /// caller from a rendered prompt; this function only computes numbers.
    #[must_use]
    pub fn calculate(session: &Session, config: &AssessmentConfig, now: chrono::DateTime<chrono::Utc>) -> GradePayload {
        let weights = config.grading.weights;
        let total_concepts = config.context.concepts.len().max(1) as f64;

        // Status alone, per spec §4.1's literal `mastery = |mastered| / |concepts|`.
        // `is_durably_mastered` decays with elapsed wall-clock time since
        // `last_reviewed_at`, which would make repeated calls on the same
        // terminal session disagree with each other (property P3).
        let mastered_count = session
            .concept_states
            .values()
            .filter(|s| s.status == ConceptStatus::Mastered)
            .count() as f64;
        let mastery_component = (mastered_count / total_concepts).clamp(0.0, 1.0);

        let participation_component = Self::participation_component(session);
        let improvement_component = Self::improvement_component(session);

        let blended = weights.mastery * mastery_component
            + weights.participation * participation_component
            + weights.improvement * improvement_component;

        let points_awarded = (blended.clamp(0.0, 1.0) * config.grading.points_possible * 100.0).round() / 100.0;

        let activity_progress = match session.status {
            SessionStatus::MasteryAchieved | SessionStatus::Completed => ActivityProgress::Completed,
            SessionStatus::MaxAttempts | SessionStatus::Timeout => ActivityProgress::Submitted,
            _ => ActivityProgress::Initialized,
        };
        let grading_progress = if session.status == SessionStatus::Error {
            GradingProgress::Failed
        } else {
            GradingProgress::FullyGraded
        };

        GradePayload {
            points_awarded,
            points_possible: config.grading.points_possible,
            mastery_component,
            participation_component,
            improvement_component,
            rationale: String::new(),
            student_ref: session.student_ref.clone(),
            line_item_ref: None,
            activity_progress,
            grading_progress,
            timestamp: now,
            passback_eligible: config.grading.passback_enabled,
            passback_status: PassbackStatus::Pending,
        }
    }

    /// Engagement discounted by how many distinct struggling indicators were
    /// raised over the session, floored at 0.1, topped up with a small bonus
    /// for simply showing up across many turns. The bonus is additive on top
    /// of the clamp, so this can exceed 1.0 by up to 0.10 at the extreme.
    fn participation_component(session: &Session) -> f64 {
        let struggle_penalty = 1.0 - (session.analytics.struggling_indicators.len() as f64) * 0.1;
        let base = (session.analytics.engagement_score * struggle_penalty.max(0.0)).clamp(0.1, 1.0);
        let turnout_bonus = (session.student_message_count() as f64 / 10.0).min(1.0) * 0.10;
        base + turnout_bonus
    }

    /// Share of concepts that moved past `unseen` at all, rewarding visible
    /// effort on concepts that never reached mastery.
    fn improvement_component(session: &Session) -> f64 {
        let total = session.concept_states.len().max(1) as f64;
        let touched = session
            .concept_states
            .values()
            .filter(|s| s.status != ConceptStatus::Unseen)
            .count() as f64;
        touched / total
    }
}
