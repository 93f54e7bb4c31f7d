//! Per-concept mastery bookkeeping: updates a [`ConceptState`] after each
//! graded response, predicts retention from a forgetting curve, and nudges
//! the adaptive difficulty setpoint.

use chrono::{DateTime, Utc};

use crate::domain::session::{ConceptState, ConceptStatus};

/// Consecutive correct responses needed before mastery is considered, per
/// spec §4.3 ("if correctStreak ≥ 2 ... → mark mastered").
const MASTERY_STREAK: u32 = 2;

/// `difficultySetpoint` must have climbed at least this high for a streak to
/// count as mastery — spec's "difficultySetpoint indicates ≥ threshold"
/// read as: the student held the streak at a meaningfully-adaptive
/// difficulty, not just on the easiest possible questions.
const MASTERY_DIFFICULTY_GATE: f64 = 0.5;

/// Forgetting-curve stability multiplier/floor/cap, per spec §4.3.
const STABILITY_GROWTH: f64 = 1.3;
const STABILITY_DECAY: f64 = 0.6;
const STABILITY_CAP_DAYS: f64 = 90.0;
const STABILITY_FLOOR_DAYS: f64 = 1.0;

/// Adaptive-difficulty fuzzy step: one nudge of this size, never a
/// continuous drift, per spec §4.3.
const DIFFICULTY_STEP: f64 = 0.05;
/// Recent-accuracy window the fuzzy step reacts to.
const ACCURACY_WINDOW: usize = 4;
const ACCURACY_LOW: f64 = 0.70;
const ACCURACY_HIGH: f64 = 0.80;

pub struct MasteryTracker;

impl MasteryTracker {
    /// Folds one graded response into a concept's running state: streak and
    /// forgetting-curve stability per spec §4.3, then a fuzzy difficulty
    /// step based on recent accuracy, then the status transition.
    pub fn update(state: &mut ConceptState, correct: bool, now: DateTime<Utc>) {
        state.attempt_count += 1;
        state.last_reviewed_at = Some(now);

        if correct {
            state.correct_streak += 1;
            state.stability = (state.stability * STABILITY_GROWTH).min(STABILITY_CAP_DAYS);
        } else {
            state.correct_streak = 0;
            state.stability = (state.stability * STABILITY_DECAY).max(STABILITY_FLOOR_DAYS);
        }

        state.recent_outcomes.push_back(correct);
        while state.recent_outcomes.len() > ACCURACY_WINDOW {
            state.recent_outcomes.pop_front();
        }
        Self::apply_difficulty_step(state);

        state.status = Self::status_for(state);
    }

    /// One step of 0.05 toward/away from the difficulty setpoint, chosen by
    /// recent accuracy against the 0.75 target success rate. No step at all
    /// once recent accuracy sits in `[0.70, 0.80]`.
    fn apply_difficulty_step(state: &mut ConceptState) {
        let window = &state.recent_outcomes;
        if window.is_empty() {
            return;
        }
        let accuracy = window.iter().filter(|c| **c).count() as f64 / window.len() as f64;
        if accuracy < ACCURACY_LOW {
            state.difficulty_setpoint = (state.difficulty_setpoint - DIFFICULTY_STEP).max(0.0);
        } else if accuracy > ACCURACY_HIGH {
            state.difficulty_setpoint = (state.difficulty_setpoint + DIFFICULTY_STEP).min(1.0);
        }
    }

    /// Advances on a qualifying correct streak, demotes to `probed` on a
    /// miss, and never regresses a concept out of `mastered` on a later
    /// single miss (see DESIGN.md's resolution of this open point). The
    /// very first attempt always lands on `probed` regardless of
    /// correctness — mastery needs a streak, and a lone miss shouldn't
    /// un-probe a concept that was never anything but unseen before it.
    fn status_for(state: &ConceptState) -> ConceptStatus {
        if state.status == ConceptStatus::Mastered {
            return ConceptStatus::Mastered;
        }
        if state.attempt_count <= 1 {
            return ConceptStatus::Probed;
        }
        if state.correct_streak >= MASTERY_STREAK && state.difficulty_setpoint >= MASTERY_DIFFICULTY_GATE {
            return ConceptStatus::Mastered;
        }
        if state.correct_streak > 0 {
            ConceptStatus::Partial
        } else {
            ConceptStatus::Probed
        }
    }

    /// Forgetting-curve retention estimate in `[0, 1]`, based on elapsed
    /// days since the concept was last reviewed and its current stability.
    #[must_use]
    pub fn predicted_retention(state: &ConceptState, now: DateTime<Utc>) -> f64 {
        let Some(last) = state.last_reviewed_at else {
            return 0.0;
        };
        let elapsed_days = (now - last).num_milliseconds() as f64 / 86_400_000.0;
        if elapsed_days <= 0.0 {
            return 1.0;
        }
        (-elapsed_days / state.stability.max(STABILITY_FLOOR_DAYS)).exp().clamp(0.0, 1.0)
    }

    /// Whether a concept counts as currently mastered with high confidence,
    /// accounting for decay since the last review.
    #[must_use]
    pub fn is_durably_mastered(state: &ConceptState, now: DateTime<Utc>, retention_floor: f64) -> bool {
        state.status == ConceptStatus::Mastered && Self::predicted_retention(state, now) >= retention_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_concept_becomes_probed_after_first_attempt() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, true, now);
        assert_eq!(state.status, ConceptStatus::Probed);
        assert_eq!(state.attempt_count, 1);
    }

    #[test]
    fn streak_of_two_correct_reaches_mastered() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        for _ in 0..2 {
            MasteryTracker::update(&mut state, true, now);
        }
        assert_eq!(state.correct_streak, 2);
        assert_eq!(state.status, ConceptStatus::Mastered);
    }

    #[test]
    fn a_single_correct_after_a_miss_is_only_partial() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, false, now);
        MasteryTracker::update(&mut state, true, now);
        assert_eq!(state.correct_streak, 1);
        assert_eq!(state.status, ConceptStatus::Partial);
    }

    #[test]
    fn incorrect_answer_resets_streak_and_demotes_to_probed() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, false, now);
        MasteryTracker::update(&mut state, true, now);
        MasteryTracker::update(&mut state, false, now);
        assert_eq!(state.correct_streak, 0);
        assert_eq!(state.status, ConceptStatus::Probed);
    }

    #[test]
    fn mastered_concept_never_regresses_from_a_single_miss() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        for _ in 0..2 {
            MasteryTracker::update(&mut state, true, now);
        }
        MasteryTracker::update(&mut state, false, now);
        assert_eq!(state.status, ConceptStatus::Mastered);
    }

    #[test]
    fn stability_grows_multiplicatively_on_correct_answers() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, true, now);
        assert!((state.stability - 1.3).abs() < 1e-9);
    }

    #[test]
    fn stability_decays_but_never_below_the_floor() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, false, now);
        assert!((state.stability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stability_never_exceeds_the_ninety_day_cap() {
        let mut state = ConceptState { stability: 89.0, ..ConceptState::default() };
        let now = Utc::now();
        MasteryTracker::update(&mut state, true, now);
        assert!(state.stability <= 90.0);
    }

    #[test]
    fn sustained_low_accuracy_steps_difficulty_down() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        let mut prev = state.difficulty_setpoint;
        for _ in 0..ACCURACY_WINDOW {
            MasteryTracker::update(&mut state, false, now);
            assert!(state.difficulty_setpoint <= prev);
            prev = state.difficulty_setpoint;
        }
        assert!(state.difficulty_setpoint < 0.5);
    }

    #[test]
    fn sustained_high_accuracy_steps_difficulty_up() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        for _ in 0..ACCURACY_WINDOW {
            MasteryTracker::update(&mut state, true, now);
        }
        // Mastery lands after the second correct answer, which then holds
        // steady — difficulty only keeps climbing while still non-mastered.
        assert!(state.difficulty_setpoint >= 0.5 + DIFFICULTY_STEP);
    }

    #[test]
    fn difficulty_step_is_always_exactly_five_hundredths() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, false, now);
        assert!((state.difficulty_setpoint - (0.5 - DIFFICULTY_STEP)).abs() < 1e-9);
    }

    #[test]
    fn retention_decays_with_elapsed_time() {
        let mut state = ConceptState::default();
        let now = Utc::now();
        MasteryTracker::update(&mut state, true, now);
        let immediate = MasteryTracker::predicted_retention(&state, now);
        let later = MasteryTracker::predicted_retention(&state, now + chrono::Duration::days(10));
        assert!(later < immediate);
    }

    #[test]
    fn never_reviewed_concept_has_zero_retention() {
        let state = ConceptState::default();
        assert_eq!(MasteryTracker::predicted_retention(&state, Utc::now()), 0.0);
    }
}
