//! Shared fixtures for the integration suite. Not a test binary itself —
//! included via `mod support;` in each scenario file.

use std::sync::Arc;

use cac_engine::domain::config::{AssessmentConfig, AssessmentContext, AssessmentSettings, ConceptId, GradeWeights, GradingConfig};
use cac_engine::domain::ids::ConfigId;
use cac_engine::engine::ConversationalAssessmentEngine;
use cac_engine::grade::LoggingPassbackClient;
use cac_engine::integrity::{IntegrityEvaluator, IntegrityThresholds};
use cac_engine::llm::{LlmClient, ScriptedLlmClient};
use cac_engine::prompt::PromptBuilder;

#[allow(dead_code)]
pub fn config(concepts: &[&str], mastery_threshold: f64, max_attempts: u32) -> AssessmentConfig {
    AssessmentConfig {
        config_id: ConfigId::new(),
        assessment_title: "Fractions Check-in".into(),
        settings: AssessmentSettings {
            mastery_threshold,
            max_attempts,
            time_limit_minutes: None,
            allow_hints: true,
            show_feedback: true,
            adaptive_difficulty: true,
            require_mastery: true,
        },
        context: AssessmentContext {
            concepts: concepts.iter().map(|c| ConceptId::from(*c)).collect(),
            learning_objectives: vec!["Add fractions with unlike denominators".into()],
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

#[allow(dead_code)]
pub fn engine_with_script(script: Vec<&str>) -> Arc<ConversationalAssessmentEngine> {
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(script));
    let prompts = Arc::new(PromptBuilder::new().unwrap());
    let integrity = Arc::new(IntegrityEvaluator::new(IntegrityThresholds::default(), 10_000, 10_000));
    let passback = Arc::new(LoggingPassbackClient);
    Arc::new(ConversationalAssessmentEngine::new(llm, prompts, integrity, passback))
}

#[allow(dead_code)]
pub fn understood_turn(concept: &str, next_target: &str) -> String {
    format!(
        r#"{{"understanding":{{"level":"good","confidence":0.9,"concepts_understood":["{concept}"],"misconceptions":[]}},
        "mastery":{{"progress":0.6,"achieved":true}},
        "engagement":{{"level":"high","struggling_signals":[]}},
        "next_question":{{"type":"application","target_concept":"{next_target}","difficulty_hint":0.6}}}}"#
    )
}
