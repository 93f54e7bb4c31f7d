//! `ConversationalAssessmentEngine`: the turn pipeline itself, expressed as
//! plain functions over an owned `&mut Session` so it can be driven directly
//! in tests and wrapped by `SessionDurableActor` for concurrent access.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::analysis::{Analysis, ResponseAnalyzer};
use crate::domain::config::AssessmentConfig;
use crate::domain::session::{
    AuthenticityVerdict, ConceptStatus, Message, MessageMetadata, MessageRole, Session, SessionStatus,
};
use crate::error::{CacError, Result};
use crate::grade::{GradeCalculator, GradePayload, PassbackClient};
use crate::integrity::{content_hash, IntegrityAction, IntegrityEvaluator};
use crate::llm::{GenerateOptions, LlmClient};
use crate::mastery::MasteryTracker;
use crate::policy::{ProgressionDecision, ProgressionPolicy};
use crate::prompt::PromptBuilder;

pub struct TurnOutcome {
    pub ai_message: Option<Message>,
    pub decision: ProgressionDecision,
    pub status: SessionStatus,
}

pub struct ConversationalAssessmentEngine {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptBuilder>,
    integrity: Arc<IntegrityEvaluator>,
    passback: Arc<dyn PassbackClient>,
}

impl ConversationalAssessmentEngine {
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptBuilder>,
        integrity: Arc<IntegrityEvaluator>,
        passback: Arc<dyn PassbackClient>,
    ) -> Self {
        Self { llm, prompts, integrity, passback }
    }

    /// Creates a fresh session and its opening message. The caller commits
    /// the returned session to the store at version 1.
    pub async fn initialize(
        &self,
        config: &AssessmentConfig,
        student_ref: String,
        course_ref: String,
        session_token: String,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        config.validate()?;
        let mut session = Session::new(config, student_ref, course_ref, session_token, now);

        let prompt = self.prompts.render_welcome_prompt(config)?;
        let welcome_text = self
            .llm
            .generate(&prompt, GenerateOptions::default())
            .await
            .map_err(CacError::from)?;

        session.conversation.push(Message {
            id: crate::domain::ids::MessageId::new(),
            session_id: session.id,
            role: MessageRole::Question,
            content: welcome_text,
            timestamp: now,
            metadata: None,
            content_hash: String::new(),
            integrity: None,
            source_prompt: Some(prompt),
        });
        session.status = SessionStatus::Active;
        session.version = 1;
        Ok(session)
    }

    /// Runs one full student turn: integrity check, append, analyze, update
    /// mastery, decide, and render the next AI message. Never panics on a
    /// malformed LLM response — analysis and rendering both have
    /// deterministic fallbacks.
    pub async fn process_response(
        &self,
        session: &mut Session,
        config: &AssessmentConfig,
        student_text: &str,
        response_time_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        session.enforce_timeout(now);
        if session.status.is_terminal() {
            return Err(CacError::InvalidStatus(format!(
                "session {} is already {}",
                session.id, session.status
            )));
        }

        let recent_student_texts: Vec<String> = session
            .conversation
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Student)
            .take(20)
            .map(|m| m.content.clone())
            .collect();
        let outcome = self
            .integrity
            .evaluate(session.id, student_text, response_time_ms, &recent_student_texts, now);

        let hash = content_hash(student_text);
        session.security.checks.extend(outcome.checks.clone());
        session.security.last_validation_at = now;

        let verdict = AuthenticityVerdict { risk_score: outcome.risk_score, action: outcome.action };
        session.conversation.push(Message {
            id: crate::domain::ids::MessageId::new(),
            session_id: session.id,
            role: MessageRole::Student,
            content: student_text.to_string(),
            timestamp: now,
            metadata: Some(MessageMetadata { response_time_ms, ..MessageMetadata::default() }),
            content_hash: hash,
            integrity: Some(verdict),
            source_prompt: None,
        });
        session.timing.last_activity_at = now;
        session.timing.accumulated_ms += i64::try_from(response_time_ms.unwrap_or(0)).unwrap_or(i64::MAX);

        if outcome.action == IntegrityAction::Block {
            session.status = SessionStatus::Error;
            session.version += 1;
            return Err(CacError::IntegrityBlocked(format!(
                "session {} blocked: risk_score {:.2}",
                session.id, outcome.risk_score
            )));
        }

        let analyzer = ResponseAnalyzer::new(self.llm.as_ref(), self.prompts.as_ref());
        let analysis = analyzer.analyze(student_text, session).await;
        self.apply_analysis(session, &analysis, config, now);

        let decision = ProgressionPolicy::decide(session, &analysis, config, now);
        self.apply_decision(session, config, &analysis, &decision, now).await?;

        let ai_message = session.conversation.last().filter(|m| m.role != MessageRole::Student).cloned();
        session.version += 1;

        Ok(TurnOutcome { ai_message, decision, status: session.status })
    }

    fn apply_analysis(&self, session: &mut Session, analysis: &Analysis, config: &AssessmentConfig, now: DateTime<Utc>) {
        session.progress.attempt_number += 1;

        for concept in &analysis.understanding.concepts_understood {
            if let Some(state) = session.concept_states.get_mut(concept) {
                MasteryTracker::update(state, true, now);
            }
        }
        for concept in &analysis.understanding.misconceptions {
            if let Some(state) = session.concept_states.get_mut(concept) {
                MasteryTracker::update(state, false, now);
            }
        }

        session.progress.concepts_mastered = session
            .concept_states
            .iter()
            .filter(|(_, s)| s.status == ConceptStatus::Mastered)
            .map(|(c, _)| c.clone())
            .collect();
        session.progress.concepts_need_work = session
            .concept_states
            .iter()
            .filter(|(_, s)| s.status == ConceptStatus::Partial || s.status == ConceptStatus::Probed)
            .map(|(c, _)| c.clone())
            .collect();
        session.progress.overall_score = Some(analysis.mastery.progress);
        session.progress.current_step = (session.progress.current_step + 1).min(session.progress.total_steps);

        // Invariant I6 holds after every turn, not just at termination: the
        // fraction of mastered concepts against the configured threshold,
        // independent of whatever `ProgressionDecision` this turn reaches.
        let total_concepts = config.context.concepts.len().max(1) as f64;
        session.progress.mastery_achieved =
            session.progress.concepts_mastered.len() as f64 / total_concepts >= config.settings.mastery_threshold;

        session.analytics.engagement_score = match analysis.engagement.level {
            crate::analysis::EngagementLevel::Low => 0.2,
            crate::analysis::EngagementLevel::Medium => 0.55,
            crate::analysis::EngagementLevel::High => 0.9,
        };
        for signal in &analysis.engagement.struggling_signals {
            if !session.analytics.struggling_indicators.contains(signal) {
                session.analytics.struggling_indicators.push(signal.clone());
            }
        }
    }

    async fn apply_decision(
        &self,
        session: &mut Session,
        config: &AssessmentConfig,
        analysis: &Analysis,
        decision: &ProgressionDecision,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match decision {
            ProgressionDecision::MasteryAchieved => {
                // `apply_analysis` already recomputed `mastery_achieved` from
                // the fraction this turn; `decide` only reaches this arm
                // when that fraction condition held.
                session.status = SessionStatus::MasteryAchieved;
            }
            ProgressionDecision::MaxAttemptsReached => {
                session.status = SessionStatus::MaxAttempts;
            }
            ProgressionDecision::TimedOut => {
                session.status = SessionStatus::Timeout;
            }
            ProgressionDecision::Complete => {
                session.status = SessionStatus::Completed;
            }
            ProgressionDecision::OfferHint => {
                let prompt = self.prompts.render_feedback_prompt(
                    &session.conversation.last().map(|m| m.content.clone()).unwrap_or_default(),
                    &analysis.understanding.level.to_string(),
                    &analysis.understanding.misconceptions,
                    true,
                )?;
                self.append_ai_reply(session, &prompt, MessageRole::Hint, now).await?;
                session.status = SessionStatus::AwaitingResponse;
            }
            ProgressionDecision::Feedback => {
                let prompt = self.prompts.render_feedback_prompt(
                    &session.conversation.last().map(|m| m.content.clone()).unwrap_or_default(),
                    &analysis.understanding.level.to_string(),
                    &analysis.understanding.misconceptions,
                    false,
                )?;
                self.append_ai_reply(session, &prompt, MessageRole::Feedback, now).await?;
                session.status = SessionStatus::AwaitingResponse;
            }
            ProgressionDecision::MasteryCheck(target) => {
                let prompt = {
                    let ctx = crate::analysis::AnalyzerContext::from_session(session);
                    self.prompts.render_next_question_prompt(
                        &analysis.understanding.concepts_understood,
                        &ctx,
                        target,
                        "mastery_check",
                        analysis.next_question.difficulty_hint,
                    )?
                };
                self.append_ai_reply(session, &prompt, MessageRole::MasteryCheck, now).await?;
                session.status = SessionStatus::AwaitingResponse;
            }
            ProgressionDecision::Continue | ProgressionDecision::AdvanceConcept(_) => {
                let target = match decision {
                    ProgressionDecision::AdvanceConcept(c) => Some(c.clone()),
                    _ => analysis.next_question.target_concept.clone(),
                };
                if let Some(target) = target {
                    let prompt = {
                        let ctx = crate::analysis::AnalyzerContext::from_session(session);
                        self.prompts.render_next_question_prompt(
                            &analysis.understanding.concepts_understood,
                            &ctx,
                            &target,
                            &analysis.next_question.question_type.to_string(),
                            analysis.next_question.difficulty_hint,
                        )?
                    };
                    self.append_ai_reply(session, &prompt, MessageRole::Question, now).await?;
                } else {
                    let prompt = self.prompts.render_feedback_prompt(
                        &session.conversation.last().map(|m| m.content.clone()).unwrap_or_default(),
                        &analysis.understanding.level.to_string(),
                        &analysis.understanding.misconceptions,
                        false,
                    )?;
                    self.append_ai_reply(session, &prompt, MessageRole::Feedback, now).await?;
                }
                session.status = SessionStatus::AwaitingResponse;
            }
        }
        let _ = config;
        Ok(())
    }

    async fn append_ai_reply(
        &self,
        session: &mut Session,
        prompt: &str,
        role: MessageRole,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let text = self
            .llm
            .generate(prompt, GenerateOptions::default())
            .await
            .map_err(CacError::from)?;
        session.conversation.push(Message {
            id: crate::domain::ids::MessageId::new(),
            session_id: session.id,
            role,
            content: text,
            timestamp: now,
            metadata: None,
            content_hash: String::new(),
            integrity: None,
            source_prompt: Some(prompt.to_string()),
        });
        Ok(())
    }

    /// Re-renders and regenerates the most recent AI message, per spec step
    /// 8: replays the exact prompt that produced it against the LLM and
    /// appends the new reply as a fresh, separately-timestamped message
    /// tagged `metadata.retry = true`. The prior message is left untouched —
    /// once appended, a message is immutable (invariant I1).
    pub async fn retry_last_ai(&self, session: &mut Session, now: DateTime<Utc>) -> Result<()> {
        let Some(last) = session.conversation.last() else {
            return Err(CacError::InvalidStatus("no ai message to retry".into()));
        };
        if last.role == MessageRole::Student {
            return Err(CacError::InvalidStatus("last message was from the student".into()));
        }
        let role = last.role;
        let prompt = last
            .source_prompt
            .clone()
            .ok_or_else(|| CacError::InvalidStatus("no recorded prompt to retry".into()))?;

        let text = self
            .llm
            .generate(&prompt, GenerateOptions::default())
            .await
            .map_err(CacError::from)?;

        session.conversation.push(Message {
            id: crate::domain::ids::MessageId::new(),
            session_id: session.id,
            role,
            content: text,
            timestamp: now,
            metadata: Some(MessageMetadata { retry: true, ..MessageMetadata::default() }),
            content_hash: String::new(),
            integrity: None,
            source_prompt: Some(prompt),
        });
        session.version += 1;
        Ok(())
    }

    /// Computes and delivers the final grade. Requires a terminal session.
    pub async fn calculate_final_grade(
        &self,
        session: &Session,
        config: &AssessmentConfig,
        now: DateTime<Utc>,
    ) -> Result<GradePayload> {
        if !session.status.is_terminal() {
            return Err(CacError::InvalidStatus(format!(
                "session {} is not finished ({})",
                session.id, session.status
            )));
        }
        let mut payload = GradeCalculator::calculate(session, config, now);

        let mastered: Vec<_> = session.progress.concepts_mastered.iter().cloned().collect();
        let needs_work: Vec<_> = session.progress.concepts_need_work.iter().cloned().collect();
        if let Ok(prompt) = self.prompts.render_grade_rationale_prompt(&mastered, &needs_work, payload.mastery_component) {
            if let Ok(rationale) = self.llm.generate(&prompt, GenerateOptions::default()).await {
                payload.rationale = rationale;
            }
        }

        payload.passback_status = if config.grading.passback_enabled {
            match self.passback.send(session.id, &payload).await {
                Ok(()) => crate::grade::PassbackStatus::Sent,
                Err(e) => return Err(CacError::Other(e.into())),
            }
        } else {
            crate::grade::PassbackStatus::Skipped
        };

        Ok(payload)
    }
}
