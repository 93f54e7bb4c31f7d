//! `ResponseAnalyzer` converts a student utterance and a session snapshot
//! into a structured [`Analysis`]. Pure with respect to session state: it
//! never mutates the session itself.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::domain::{ConceptId, Session};
use crate::llm::LlmClient;
use crate::prompt::PromptBuilder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnderstandingLevel {
    None,
    Partial,
    Good,
    Excellent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuestionType {
    Comprehension,
    Application,
    Analysis,
    Reflection,
    MasteryCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub level: UnderstandingLevel,
    pub confidence: f64,
    pub concepts_understood: Vec<ConceptId>,
    pub misconceptions: Vec<ConceptId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterySignal {
    pub progress: f64,
    pub achieved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engagement {
    pub level: EngagementLevel,
    pub struggling_signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextQuestionHint {
    pub question_type: QuestionType,
    pub target_concept: Option<ConceptId>,
    pub difficulty_hint: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub understanding: Understanding,
    pub mastery: MasterySignal,
    pub engagement: Engagement,
    pub next_question: NextQuestionHint,
}

/// Raw shape the LLM is asked to emit. Kept separate from [`Analysis`] so a
/// malformed/partial payload can be detected field-by-field before we decide
/// whether to fall back.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    understanding: RawUnderstanding,
    mastery: RawMastery,
    engagement: RawEngagement,
    next_question: RawNextQuestion,
}

#[derive(Debug, Deserialize)]
struct RawUnderstanding {
    level: String,
    confidence: f64,
    #[serde(default)]
    concepts_understood: Vec<String>,
    #[serde(default)]
    misconceptions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMastery {
    progress: f64,
    achieved: bool,
}

#[derive(Debug, Deserialize)]
struct RawEngagement {
    level: String,
    #[serde(default)]
    struggling_signals: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawNextQuestion {
    #[serde(rename = "type")]
    question_type: String,
    target_concept: Option<String>,
    difficulty_hint: f64,
}

fn parse_understanding_level(s: &str) -> UnderstandingLevel {
    match s {
        "good" => UnderstandingLevel::Good,
        "excellent" => UnderstandingLevel::Excellent,
        "partial" => UnderstandingLevel::Partial,
        _ => UnderstandingLevel::None,
    }
}

fn parse_engagement_level(s: &str) -> EngagementLevel {
    match s {
        "high" => EngagementLevel::High,
        "medium" => EngagementLevel::Medium,
        _ => EngagementLevel::Low,
    }
}

fn parse_question_type(s: &str) -> QuestionType {
    match s {
        "application" => QuestionType::Application,
        "analysis" => QuestionType::Analysis,
        "reflection" => QuestionType::Reflection,
        "mastery_check" => QuestionType::MasteryCheck,
        _ => QuestionType::Comprehension,
    }
}

impl From<RawAnalysis> for Analysis {
    fn from(raw: RawAnalysis) -> Self {
        Analysis {
            understanding: Understanding {
                level: parse_understanding_level(&raw.understanding.level),
                confidence: raw.understanding.confidence.clamp(0.0, 1.0),
                concepts_understood: raw
                    .understanding
                    .concepts_understood
                    .into_iter()
                    .map(ConceptId)
                    .collect(),
                misconceptions: raw
                    .understanding
                    .misconceptions
                    .into_iter()
                    .map(ConceptId)
                    .collect(),
            },
            mastery: MasterySignal {
                progress: raw.mastery.progress.clamp(0.0, 1.0),
                achieved: raw.mastery.achieved,
            },
            engagement: Engagement {
                level: parse_engagement_level(&raw.engagement.level),
                struggling_signals: raw.engagement.struggling_signals,
            },
            next_question: NextQuestionHint {
                question_type: parse_question_type(&raw.next_question.question_type),
                target_concept: raw.next_question.target_concept.map(ConceptId),
                difficulty_hint: raw.next_question.difficulty_hint.clamp(0.0, 1.0),
            },
        }
    }
}

/// Deterministic fallback used when the LLM response is missing or fails to
/// parse as [`RawAnalysis`]: reports partial understanding and steers the
/// next question toward a concept the student still needs work on.
#[must_use]
pub fn fallback_analysis(session: &Session) -> Analysis {
    let target_concept = session
        .progress
        .concepts_need_work
        .iter()
        .next()
        .cloned()
        .or_else(|| session.concept_states.keys().next().cloned());

    Analysis {
        understanding: Understanding {
            level: UnderstandingLevel::Partial,
            confidence: 0.3,
            concepts_understood: Vec::new(),
            misconceptions: Vec::new(),
        },
        mastery: MasterySignal {
            progress: session.progress.overall_score.unwrap_or(0.0),
            achieved: false,
        },
        engagement: Engagement {
            level: EngagementLevel::Medium,
            struggling_signals: Vec::new(),
        },
        next_question: NextQuestionHint {
            question_type: QuestionType::Comprehension,
            target_concept,
            difficulty_hint: 0.5,
        },
    }
}

/// The last ten messages, remaining concepts, current difficulty setpoints,
/// and misconception history — everything the analyzer is allowed to see,
/// so it stays pure over an explicit input rather than the live session.
pub struct AnalyzerContext<'a> {
    pub recent_messages: &'a [crate::domain::Message],
    pub remaining_concepts: Vec<ConceptId>,
    pub difficulty_setpoints: Vec<(ConceptId, f64)>,
    pub misconception_history: Vec<ConceptId>,
}

const RECENT_WINDOW: usize = 10;

impl<'a> AnalyzerContext<'a> {
    #[must_use]
    pub fn from_session(session: &'a Session) -> Self {
        let start = session.conversation.len().saturating_sub(RECENT_WINDOW);
        AnalyzerContext {
            recent_messages: &session.conversation[start..],
            remaining_concepts: session
                .concept_states
                .iter()
                .filter(|(_, s)| s.status != crate::domain::ConceptStatus::Mastered)
                .map(|(c, _)| c.clone())
                .collect(),
            difficulty_setpoints: session
                .concept_states
                .iter()
                .map(|(c, s)| (c.clone(), s.difficulty_setpoint))
                .collect(),
            misconception_history: session
                .conversation
                .iter()
                .filter_map(|m| m.metadata.as_ref())
                .flat_map(|m| m.concepts_addressed.clone())
                .collect(),
        }
    }
}

pub struct ResponseAnalyzer<'a> {
    llm: &'a dyn LlmClient,
    prompts: &'a PromptBuilder,
}

impl<'a> ResponseAnalyzer<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmClient, prompts: &'a PromptBuilder) -> Self {
        Self { llm, prompts }
    }

    /// A single schema-constrained LLM call; tolerates malformed JSON by
    /// falling back to [`fallback_analysis`].
    pub async fn analyze(&self, student_text: &str, session: &Session) -> Analysis {
        let ctx = AnalyzerContext::from_session(session);
        let prompt = match self.prompts.render_analysis_prompt(student_text, &ctx) {
            Ok(p) => p,
            Err(_) => return fallback_analysis(session),
        };

        let completion = match self.llm.generate(&prompt, Default::default()).await {
            Ok(text) => text,
            Err(_) => return fallback_analysis(session),
        };

        match serde_json::from_str::<RawAnalysis>(&completion) {
            Ok(raw) => raw.into(),
            Err(_) => fallback_analysis(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::fixtures::config;
    use crate::domain::session::ConceptState;
    use chrono::Utc;

    fn session_with_concepts(concepts: &[&str]) -> Session {
        let cfg = config(concepts, 0.75, 5);
        Session::new(&cfg, "student-1".into(), "course-1".into(), "tok".into(), Utc::now())
    }

    #[test]
    fn parses_well_formed_json() {
        let raw = r#"{
            "understanding": {"level": "good", "confidence": 0.9, "concepts_understood": ["A"], "misconceptions": []},
            "mastery": {"progress": 0.5, "achieved": false},
            "engagement": {"level": "high", "struggling_signals": []},
            "next_question": {"type": "application", "target_concept": "B", "difficulty_hint": 0.6}
        }"#;
        let parsed: RawAnalysis = serde_json::from_str(raw).unwrap();
        let analysis: Analysis = parsed.into();
        assert_eq!(analysis.understanding.level, UnderstandingLevel::Good);
        assert_eq!(analysis.understanding.concepts_understood, vec![ConceptId::from("A")]);
        assert_eq!(analysis.next_question.question_type, QuestionType::Application);
    }

    #[test]
    fn malformed_json_triggers_fallback() {
        let session = session_with_concepts(&["A", "B"]);
        let bad = "{not valid json";
        let result = serde_json::from_str::<RawAnalysis>(bad);
        assert!(result.is_err());
        let analysis = fallback_analysis(&session);
        assert_eq!(analysis.understanding.level, UnderstandingLevel::Partial);
        assert!(!analysis.mastery.achieved);
    }

    #[test]
    fn fallback_targets_a_need_work_concept_first() {
        let mut session = session_with_concepts(&["A", "B"]);
        session
            .progress
            .concepts_need_work
            .insert(ConceptId::from("B"));
        let analysis = fallback_analysis(&session);
        assert_eq!(analysis.next_question.target_concept, Some(ConceptId::from("B")));
    }

    #[test]
    fn analyzer_context_windows_to_last_ten_messages() {
        let mut session = session_with_concepts(&["A"]);
        for i in 0..15 {
            session.conversation.push(crate::domain::Message {
                id: crate::domain::ids::MessageId::new(),
                session_id: session.id,
                role: crate::domain::MessageRole::Student,
                content: format!("msg {i}"),
                timestamp: Utc::now(),
                metadata: None,
                content_hash: String::new(),
                integrity: None,
                source_prompt: None,
            });
        }
        let ctx = AnalyzerContext::from_session(&session);
        assert_eq!(ctx.recent_messages.len(), RECENT_WINDOW);
        assert_eq!(ctx.recent_messages[0].content, "msg 5");
    }

    #[test]
    fn remaining_concepts_excludes_mastered() {
        let mut session = session_with_concepts(&["A", "B"]);
        session
            .concept_states
            .insert(ConceptId::from("A"), ConceptState {
                status: crate::domain::ConceptStatus::Mastered,
                ..ConceptState::default()
            });
        let ctx = AnalyzerContext::from_session(&session);
        assert_eq!(ctx.remaining_concepts, vec![ConceptId::from("B")]);
    }
}
