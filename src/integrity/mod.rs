//! Lightweight anti-cheating checks run on every student turn: response
//! timing plausibility, per-session rate limiting, response-authenticity
//! (similarity + AI-generation heuristics), and tamper detection on the
//! conversation's content hash chain. Each check produces an
//! [`IntegrityCheck`] record; [`IntegrityEvaluator::evaluate`] folds them
//! into a single [`IntegrityAction`] the caller acts on.

mod rate_limit;

pub use rate_limit::SessionRateLimiter;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::domain::session::{IntegrityCheck, IntegrityCheckType, IntegrityVerdict};
use crate::domain::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrityAction {
    Allow,
    Warn,
    Flag,
    Block,
}

#[derive(Debug, Clone, Copy)]
pub struct IntegrityThresholds {
    pub warn_at: f64,
    pub flag_at: f64,
    pub block_at: f64,
}

impl Default for IntegrityThresholds {
    fn default() -> Self {
        Self {
            warn_at: 0.3,
            flag_at: 0.6,
            block_at: 0.85,
        }
    }
}

/// Minimum plausible typing time, in milliseconds per character, below which
/// a response reads as pasted or scripted rather than typed.
const MIN_MS_PER_CHAR: f64 = 12.0;

/// Jaccard similarity above this against any earlier student message in the
/// session reads as copy-paste reuse rather than a fresh answer.
const SIMILARITY_FLAG_THRESHOLD: f64 = 0.8;

/// Boilerplate phrases an LLM tends to emit when asked to answer "as itself"
/// rather than as the student; any one present is a strong AI-generation signal.
const AI_BOILERPLATE_PATTERNS: &[&str] = &[
    "as an ai language model",
    "as an ai,",
    "i don't have personal experiences",
    "i do not have personal experiences",
    "i'm just a language model",
    "as a large language model",
    "i don't have the ability to",
];

/// Sentence-count/length floor past which otherwise-unremarkable prose reads
/// as suspiciously structured (AI-generated) rather than conversational.
const STRUCTURAL_SENTENCE_FLOOR: usize = 4;
const STRUCTURAL_LENGTH_FLOOR: usize = 200;

/// Result of folding every check's risk contribution into one verdict, plus
/// the individual records a caller appends to `Session.security.checks`.
pub struct EvaluationOutcome {
    pub risk_score: f64,
    pub action: IntegrityAction,
    pub checks: Vec<IntegrityCheck>,
}

pub struct IntegrityEvaluator {
    thresholds: IntegrityThresholds,
    rate_limiter: SessionRateLimiter,
}

impl IntegrityEvaluator {
    #[must_use]
    pub fn new(thresholds: IntegrityThresholds, global_max_per_hour: u32, per_session_max_per_hour: u32) -> Self {
        Self {
            thresholds,
            rate_limiter: SessionRateLimiter::new(global_max_per_hour, per_session_max_per_hour),
        }
    }

    /// Runs every check for one student turn and folds the results into a
    /// single action. `response_time_ms` is the gap since the question was
    /// shown; `recent_student_messages` is this session's prior student
    /// utterances (most recent last), used both by the similarity check and,
    /// via their content hashes, by the tampering check.
    #[must_use]
    pub fn evaluate(
        &self,
        session_id: SessionId,
        student_text: &str,
        response_time_ms: Option<u64>,
        recent_student_messages: &[String],
        now: chrono::DateTime<chrono::Utc>,
    ) -> EvaluationOutcome {
        let mut checks = Vec::with_capacity(4);
        let mut risk_score: f64 = 0.0;

        let (timing_check, timing_risk) = self.evaluate_timing(student_text, response_time_ms, now);
        risk_score = risk_score.max(timing_risk);
        checks.push(timing_check);

        let (rate_check, rate_risk) = self.evaluate_rate_limit(session_id, now);
        risk_score = risk_score.max(rate_risk);
        checks.push(rate_check);

        let (authenticity_check, authenticity_risk) =
            self.evaluate_response_authenticity(student_text, recent_student_messages, now);
        risk_score = risk_score.max(authenticity_risk);
        checks.push(authenticity_check);

        let recent_hashes: Vec<String> = recent_student_messages.iter().map(|m| content_hash(m)).collect();
        let (tamper_check, tamper_risk) = self.evaluate_tampering(student_text, &recent_hashes, now);
        risk_score = risk_score.max(tamper_risk);
        checks.push(tamper_check);

        let action = self.action_for(risk_score);
        EvaluationOutcome {
            risk_score,
            action,
            checks,
        }
    }

    fn action_for(&self, risk_score: f64) -> IntegrityAction {
        if risk_score >= self.thresholds.block_at {
            IntegrityAction::Block
        } else if risk_score >= self.thresholds.flag_at {
            IntegrityAction::Flag
        } else if risk_score >= self.thresholds.warn_at {
            IntegrityAction::Warn
        } else {
            IntegrityAction::Allow
        }
    }

    fn evaluate_timing(
        &self,
        student_text: &str,
        response_time_ms: Option<u64>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> (IntegrityCheck, f64) {
        let risk = match response_time_ms {
            None => 0.0,
            Some(ms) => {
                let chars = student_text.chars().count().max(1) as f64;
                let per_char = ms as f64 / chars;
                if per_char < MIN_MS_PER_CHAR {
                    (1.0 - per_char / MIN_MS_PER_CHAR).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
        };
        let verdict = verdict_for(risk, &self.thresholds);
        let check = IntegrityCheck {
            timestamp: now,
            check_type: IntegrityCheckType::Timing,
            verdict,
            risk_score: risk,
            evidence: serde_json::json!({ "response_time_ms": response_time_ms }),
        };
        (check, risk)
    }

    fn evaluate_rate_limit(&self, session_id: SessionId, now: chrono::DateTime<chrono::Utc>) -> (IntegrityCheck, f64) {
        let outcome = self.rate_limiter.record(&session_id.to_string());
        let risk = if outcome.is_err() { 1.0 } else { 0.0 };
        let verdict = verdict_for(risk, &self.thresholds);
        let check = IntegrityCheck {
            timestamp: now,
            check_type: IntegrityCheckType::RateLimit,
            verdict,
            risk_score: risk,
            evidence: serde_json::json!({ "exhausted": outcome.is_err() }),
        };
        (check, risk)
    }

    /// Folds the max Jaccard similarity against this session's own earlier
    /// student messages with an AI-generation boilerplate/structure score
    /// into one `response_authenticity` check.
    fn evaluate_response_authenticity(
        &self,
        student_text: &str,
        recent_student_messages: &[String],
        now: chrono::DateTime<chrono::Utc>,
    ) -> (IntegrityCheck, f64) {
        let max_similarity = recent_student_messages
            .iter()
            .map(|prior| jaccard_similarity(student_text, prior))
            .fold(0.0_f64, f64::max);
        let similarity_risk = if max_similarity > SIMILARITY_FLAG_THRESHOLD { max_similarity } else { 0.0 };

        let ai_score = ai_generation_score(student_text);

        let risk = similarity_risk.max(ai_score);
        let verdict = verdict_for(risk, &self.thresholds);
        let check = IntegrityCheck {
            timestamp: now,
            check_type: IntegrityCheckType::ResponseAuthenticity,
            verdict,
            risk_score: risk,
            evidence: serde_json::json!({
                "max_similarity": max_similarity,
                "ai_generation_score": ai_score,
            }),
        };
        (check, risk)
    }

    fn evaluate_tampering(
        &self,
        student_text: &str,
        recent_content_hashes: &[String],
        now: chrono::DateTime<chrono::Utc>,
    ) -> (IntegrityCheck, f64) {
        let hash = content_hash(student_text);
        let repeated = recent_content_hashes.iter().any(|h| h == &hash);
        let risk = if repeated { 0.5 } else { 0.0 };
        let verdict = verdict_for(risk, &self.thresholds);
        let check = IntegrityCheck {
            timestamp: now,
            check_type: IntegrityCheckType::Tampering,
            verdict,
            risk_score: risk,
            evidence: serde_json::json!({ "content_hash": hash, "repeated": repeated }),
        };
        (check, risk)
    }
}

fn verdict_for(risk: f64, thresholds: &IntegrityThresholds) -> IntegrityVerdict {
    if risk >= thresholds.flag_at {
        IntegrityVerdict::Fail
    } else if risk >= thresholds.warn_at {
        IntegrityVerdict::Warn
    } else {
        IntegrityVerdict::Pass
    }
}

/// Stable content hash, also used to populate `Message.content_hash`.
#[must_use]
pub fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Word-set Jaccard similarity between two utterances, case-insensitive.
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    let words_of = |s: &str| -> HashSet<String> { s.to_lowercase().split_whitespace().map(str::to_string).collect() };
    let set_a = words_of(a);
    let set_b = words_of(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Heuristic `[0, 1]` score for "this reads like an LLM completion, not a
/// student": boilerplate phrasing counts heavily; otherwise-unremarkable but
/// long, multi-sentence, evenly-structured prose counts a little.
fn ai_generation_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let boilerplate_hits = AI_BOILERPLATE_PATTERNS.iter().filter(|p| lower.contains(**p)).count();
    if boilerplate_hits > 0 {
        return 1.0;
    }

    let sentence_count = text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count();
    let structurally_regular = sentence_count >= STRUCTURAL_SENTENCE_FLOOR && text.len() > STRUCTURAL_LENGTH_FLOOR;
    if structurally_regular {
        0.4
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn evaluator() -> IntegrityEvaluator {
        IntegrityEvaluator::new(IntegrityThresholds::default(), 1000, 50)
    }

    #[test]
    fn allows_plausible_typed_response() {
        let outcome = evaluator().evaluate(
            SessionId::new(),
            "I think the answer is one half because we split it evenly.",
            Some(8000),
            &[],
            Utc::now(),
        );
        assert_eq!(outcome.action, IntegrityAction::Allow);
    }

    #[test]
    fn flags_implausibly_fast_long_response() {
        let outcome = evaluator().evaluate(
            SessionId::new(),
            "a".repeat(400).as_str(),
            Some(50),
            &[],
            Utc::now(),
        );
        assert!(matches!(outcome.action, IntegrityAction::Flag | IntegrityAction::Block));
    }

    #[test]
    fn detects_repeated_content_as_tampering_signal() {
        let text = "one half";
        let outcome = evaluator().evaluate(SessionId::new(), text, Some(8000), &[text.to_string()], Utc::now());
        assert!(outcome.checks.iter().any(|c| c.check_type == IntegrityCheckType::Tampering
            && c.verdict != IntegrityVerdict::Pass));
    }

    #[test]
    fn ai_boilerplate_phrase_triggers_block() {
        let outcome = evaluator().evaluate(
            SessionId::new(),
            "As an AI language model, I don't have personal experiences, but the answer is one half.",
            Some(500),
            &[],
            Utc::now(),
        );
        assert!(outcome.checks.iter().any(|c| c.check_type == IntegrityCheckType::ResponseAuthenticity
            && c.verdict != IntegrityVerdict::Pass));
        assert!(outcome.risk_score >= 0.3);
    }

    #[test]
    fn near_identical_resubmission_flags_similarity() {
        let prior = "The answer is one half because we split the whole into two equal parts".to_string();
        let outcome = evaluator().evaluate(
            SessionId::new(),
            "The answer is one half because we split the whole into two equal parts!",
            Some(8000),
            &[prior],
            Utc::now(),
        );
        assert!(outcome.checks.iter().any(|c| c.check_type == IntegrityCheckType::ResponseAuthenticity
            && c.verdict != IntegrityVerdict::Pass));
    }

    #[test]
    fn exhausting_per_session_rate_limit_blocks() {
        let evaluator = IntegrityEvaluator::new(IntegrityThresholds::default(), 1000, 2);
        let session_id = SessionId::new();
        for _ in 0..2 {
            evaluator.evaluate(session_id, "fine", Some(8000), &[], Utc::now());
        }
        let outcome = evaluator.evaluate(session_id, "fine", Some(8000), &[], Utc::now());
        assert_eq!(outcome.action, IntegrityAction::Block);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
