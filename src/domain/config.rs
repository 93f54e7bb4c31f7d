use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ids::ConfigId;
use crate::error::{CacError, Result};

/// Tolerance for the grading-weight sum check in `AssessmentConfig::validate`.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Immutable for a session's lifetime; supplied by the surrounding
/// launch/configuration subsystem at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    pub config_id: ConfigId,
    pub assessment_title: String,
    pub settings: AssessmentSettings,
    pub context: AssessmentContext,
    pub grading: GradingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSettings {
    /// Fraction of concepts that must be mastered, in [0.5, 1].
    pub mastery_threshold: f64,
    /// In [1, 10].
    pub max_attempts: u32,
    /// `None`/`Some(0)` both mean "no timeout".
    pub time_limit_minutes: Option<u32>,
    pub allow_hints: bool,
    pub show_feedback: bool,
    pub adaptive_difficulty: bool,
    pub require_mastery: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentContext {
    pub concepts: Vec<ConceptId>,
    pub learning_objectives: Vec<String>,
    pub prerequisites: Vec<String>,
    pub content_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    pub passback_enabled: bool,
    pub points_possible: f64,
    pub weights: GradeWeights,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GradeWeights {
    pub mastery: f64,
    pub participation: f64,
    pub improvement: f64,
}

impl GradeWeights {
    fn sum(&self) -> f64 {
        self.mastery + self.participation + self.improvement
    }
}

/// The smallest unit the engine tracks mastery over.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(pub String);

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(s: &str) -> Self {
        ConceptId(s.to_string())
    }
}

impl AssessmentConfig {
    /// `ConfigInvalid` if weights don't sum to 1 ± ε, or mastery threshold is
    /// outside [0.5, 1], or structural preconditions (non-empty concepts,
    /// max_attempts range) are violated.
    pub fn validate(&self) -> Result<()> {
        let w = self.grading.weights;
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(CacError::ConfigInvalid(format!(
                "grading weights must sum to 1.0 (got {})",
                w.sum()
            )));
        }
        if !(0.5..=1.0).contains(&self.settings.mastery_threshold) {
            return Err(CacError::ConfigInvalid(format!(
                "mastery_threshold {} out of range [0.5, 1]",
                self.settings.mastery_threshold
            )));
        }
        if !(1..=10).contains(&self.settings.max_attempts) {
            return Err(CacError::ConfigInvalid(format!(
                "max_attempts {} out of range [1, 10]",
                self.settings.max_attempts
            )));
        }
        if self.context.concepts.is_empty() {
            return Err(CacError::ConfigInvalid(
                "context.concepts must not be empty".into(),
            ));
        }
        if self.grading.points_possible < 0.0 {
            return Err(CacError::ConfigInvalid(
                "points_possible must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// `total_steps = 5 + 2·|concepts| + 3`. A progress-bar hint only; it
    /// carries no termination semantics of its own.
    #[must_use]
    pub fn total_steps(&self) -> u32 {
        5 + 2 * u32::try_from(self.context.concepts.len()).unwrap_or(u32::MAX) + 3
    }

    /// `time_limit_minutes = 0` or `None` means no timeout.
    #[must_use]
    pub fn time_limit(&self) -> Option<chrono::Duration> {
        self.settings
            .time_limit_minutes
            .filter(|&m| m > 0)
            .map(|m| chrono::Duration::minutes(i64::from(m)))
    }

    #[must_use]
    pub fn concept_index(&self) -> BTreeMap<ConceptId, usize> {
        self.context
            .concepts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn config(concepts: &[&str], threshold: f64, max_attempts: u32) -> AssessmentConfig {
        AssessmentConfig {
            config_id: ConfigId::new(),
            assessment_title: "Test Assessment".into(),
            settings: AssessmentSettings {
                mastery_threshold: threshold,
                max_attempts,
                time_limit_minutes: None,
                allow_hints: true,
                show_feedback: true,
                adaptive_difficulty: true,
                require_mastery: true,
            },
            context: AssessmentContext {
                concepts: concepts.iter().map(|c| ConceptId::from(*c)).collect(),
                learning_objectives: vec!["Understand the material".into()],
                prerequisites: vec![],
                content_ref: None,
            },
            grading: GradingConfig {
                passback_enabled: true,
                points_possible: 100.0,
                weights: GradeWeights {
                    mastery: 0.7,
                    participation: 0.2,
                    improvement: 0.1,
                },
            },
        }
    }
}
