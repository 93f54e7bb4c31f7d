//! `ProgressionPolicy`: a pure decision function over a session snapshot and
//! the latest [`Analysis`], deciding what happens next in the dialogue. Ties
//! between equally-eligible concepts are broken deterministically, seeded
//! by the session id, so the same session replays the same decision.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use crate::analysis::Analysis;
use crate::domain::config::AssessmentConfig;
use crate::domain::session::{ConceptStatus, Session, SessionStatus};
use crate::domain::{ConceptId, SessionId};
use crate::mastery::MasteryTracker;

/// Dialogue is forced terminal at this many total messages regardless of
/// mastery progress, per spec §4.4 step 5.
const MAX_TURNS: usize = 50;

/// A previously-mastered concept due for a re-probe once its predicted
/// retention drops below this, per spec §4.3.
const RETENTION_REPROBE_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressionDecision {
    /// Ask a follow-up question on the same concept (no clearer signal to
    /// act on than "keep going").
    Continue,
    /// Offer a hint before the next attempt (only when `allow_hints`).
    OfferHint,
    /// A misconception was detected this turn; give feedback before moving on.
    Feedback,
    /// Move on to a specific concept.
    AdvanceConcept(ConceptId),
    /// Probe whether a concept (already seen, possibly already mastered
    /// once) still holds, either because every concept has been probed at
    /// least once or the analyzer explicitly asked for a mastery check.
    MasteryCheck(ConceptId),
    /// Every concept is mastered (or mastery isn't required and the concept
    /// set has been exhausted).
    MasteryAchieved,
    /// The student used up `max_attempts` without reaching mastery.
    MaxAttemptsReached,
    /// The session's deadline has passed.
    TimedOut,
    /// Nothing left to probe and mastery isn't required.
    Complete,
}

pub struct ProgressionPolicy;

impl ProgressionPolicy {
    #[must_use]
    pub fn decide(
        session: &Session,
        analysis: &Analysis,
        config: &AssessmentConfig,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ProgressionDecision {
        if session.status == SessionStatus::Timeout
            || session
                .timing
                .timeout_at
                .is_some_and(|deadline| now >= deadline)
        {
            return ProgressionDecision::TimedOut;
        }

        let total_concepts = config.context.concepts.len().max(1) as f64;
        let mastery_achieved = session.progress.concepts_mastered.len() as f64 / total_concepts
            >= config.settings.mastery_threshold;
        if mastery_achieved && analysis.mastery.achieved {
            return ProgressionDecision::MasteryAchieved;
        }

        if session.progress.attempt_number >= config.settings.max_attempts {
            return ProgressionDecision::MaxAttemptsReached;
        }

        if session.conversation.len() >= MAX_TURNS {
            return ProgressionDecision::Complete;
        }

        if !analysis.understanding.misconceptions.is_empty() {
            return ProgressionDecision::Feedback;
        }

        if matches!(
            analysis.understanding.level,
            crate::analysis::UnderstandingLevel::None | crate::analysis::UnderstandingLevel::Partial
        ) && config.settings.allow_hints
        {
            return ProgressionDecision::OfferHint;
        }

        let all_probed_at_least_once = session
            .concept_states
            .values()
            .all(|s| s.status != ConceptStatus::Unseen);
        let analyzer_wants_mastery_check = analysis.next_question.question_type == crate::analysis::QuestionType::MasteryCheck;

        if analyzer_wants_mastery_check || all_probed_at_least_once {
            if let Some(target) = Self::mastery_check_target(session, analysis, now) {
                return ProgressionDecision::MasteryCheck(target);
            }
        }

        let remaining: Vec<ConceptId> = session
            .concept_states
            .iter()
            .filter(|(_, s)| s.status != ConceptStatus::Mastered)
            .map(|(c, _)| c.clone())
            .collect();

        if remaining.is_empty() {
            return ProgressionDecision::Complete;
        }

        if let Some(hint) = &analysis.next_question.target_concept {
            if remaining.contains(hint) {
                return ProgressionDecision::AdvanceConcept(hint.clone());
            }
        }

        match Self::highest_priority_concept(session, &remaining, now) {
            Some(c) => ProgressionDecision::AdvanceConcept(c),
            None => ProgressionDecision::Continue,
        }
    }

    /// Prefers the analyzer's own target if it names a concept still worth
    /// checking (anything not fresh); otherwise re-probes the mastered
    /// concept whose predicted retention has decayed the most.
    fn mastery_check_target(session: &Session, analysis: &Analysis, now: chrono::DateTime<chrono::Utc>) -> Option<ConceptId> {
        if let Some(target) = &analysis.next_question.target_concept {
            if session.concept_states.contains_key(target) {
                return Some(target.clone());
            }
        }
        session
            .concept_states
            .iter()
            .filter(|(_, s)| s.status == ConceptStatus::Mastered)
            .map(|(c, s)| (c.clone(), MasteryTracker::predicted_retention(s, now)))
            .filter(|(_, retention)| *retention < RETENTION_REPROBE_THRESHOLD)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(c, _)| c)
    }

    /// Picks among `candidates` by concept-status priority (unseen > probed
    /// > partial), tie-broken by lowest predicted retention, then by a
    /// session-seeded deterministic choice among remaining ties.
    fn highest_priority_concept(
        session: &Session,
        candidates: &[ConceptId],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<ConceptId> {
        let priority = |status: ConceptStatus| match status {
            ConceptStatus::Unseen => 0,
            ConceptStatus::Probed => 1,
            ConceptStatus::Partial => 2,
            ConceptStatus::Mastered => 3,
        };

        let best_priority = candidates
            .iter()
            .filter_map(|c| session.concept_states.get(c).map(|s| priority(s.status)))
            .min()?;

        let mut tier: Vec<&ConceptId> = candidates
            .iter()
            .filter(|c| session.concept_states.get(*c).is_some_and(|s| priority(s.status) == best_priority))
            .collect();

        if tier.len() == 1 {
            return tier.pop().cloned();
        }

        let min_retention = tier
            .iter()
            .filter_map(|c| session.concept_states.get(*c))
            .map(|s| MasteryTracker::predicted_retention(s, now))
            .fold(f64::INFINITY, f64::min);
        let mut lowest_retention: Vec<&ConceptId> = tier
            .iter()
            .filter(|c| {
                session
                    .concept_states
                    .get(**c)
                    .is_some_and(|s| (MasteryTracker::predicted_retention(s, now) - min_retention).abs() < 1e-9)
            })
            .copied()
            .collect();

        if lowest_retention.len() == 1 {
            return lowest_retention.pop().cloned();
        }

        Self::seeded_choice(session.id, &lowest_retention).cloned()
    }

    /// Deterministic tie-break among equally-eligible concepts, seeded by
    /// the session id so repeated calls for the same session agree.
    fn seeded_choice<'a>(session_id: SessionId, options: &[&'a ConceptId]) -> Option<&'a ConceptId> {
        let seed = session_id.as_uuid().as_u128() as u64;
        let mut rng = StdRng::seed_from_u64(seed);
        options.choose(&mut rng).copied()
    }
}
