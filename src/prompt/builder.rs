use tera::Context;

use crate::analysis::AnalyzerContext;
use crate::domain::{AssessmentConfig, ConceptId};
use crate::error::PromptError;

use super::engine::TeraEngine;

const TEMPLATE_WELCOME: &str = "welcome";
const TEMPLATE_NEXT_QUESTION: &str = "next_question";
const TEMPLATE_FEEDBACK: &str = "feedback";
const TEMPLATE_GRADE_RATIONALE: &str = "grade_rationale";
const TEMPLATE_ANALYSIS: &str = "analysis";

const WELCOME_SRC: &str = "\
You are tutoring a student through an assessment titled \"{{ title }}\".
Concepts to cover: {{ concepts | join(sep=\", \") }}.
Greet the student and ask an opening comprehension question about {{ first_concept }}.
";

const NEXT_QUESTION_SRC: &str = "\
The student has addressed: {{ concepts_understood | join(sep=\", \") }}.
Remaining concepts: {{ remaining_concepts | join(sep=\", \") }}.
Ask a {{ question_type }} question targeting \"{{ target_concept }}\" at difficulty {{ difficulty }}.
";

const FEEDBACK_SRC: &str = "\
The student answered: \"{{ student_text }}\".
Understanding level: {{ understanding_level }}. Misconceptions: {{ misconceptions | join(sep=\", \") }}.
Give concise, encouraging feedback{% if hint_needed %} and a hint{% endif %}.
";

const GRADE_RATIONALE_SRC: &str = "\
Summarize this student's performance for a grade rationale.
Mastered concepts: {{ mastered | join(sep=\", \") }}.
Needs work: {{ needs_work | join(sep=\", \") }}.
Overall score: {{ overall_score }}.
";

const ANALYSIS_SRC: &str = "\
Analyze the student's response and emit a single JSON object with keys
understanding, mastery, engagement, next_question, matching the documented schema exactly.
Remaining concepts: {{ remaining_concepts | join(sep=\", \") }}.
Recent exchange:
{% for m in recent_messages %}{{ m.role }}: {{ m.content }}
{% endfor %}
Student response: \"{{ student_text }}\"
";

/// Renders deterministic prompts for each point in a turn from a typed
/// context: nothing here consults global state or the clock, so the same
/// inputs always render the same string.
pub struct PromptBuilder {
    engine: TeraEngine,
}

impl PromptBuilder {
    /// Build with the built-in template set registered.
    pub fn new() -> Result<Self, PromptError> {
        let mut engine = TeraEngine::new();
        engine.add_template(TEMPLATE_WELCOME, WELCOME_SRC)?;
        engine.add_template(TEMPLATE_NEXT_QUESTION, NEXT_QUESTION_SRC)?;
        engine.add_template(TEMPLATE_FEEDBACK, FEEDBACK_SRC)?;
        engine.add_template(TEMPLATE_GRADE_RATIONALE, GRADE_RATIONALE_SRC)?;
        engine.add_template(TEMPLATE_ANALYSIS, ANALYSIS_SRC)?;
        Ok(Self { engine })
    }

    pub fn render_welcome_prompt(&self, config: &AssessmentConfig) -> Result<String, PromptError> {
        let first_concept = config
            .context
            .concepts
            .first()
            .map(|c| c.0.clone())
            .unwrap_or_default();
        let mut ctx = Context::new();
        ctx.insert("title", &config.assessment_title);
        ctx.insert(
            "concepts",
            &config.context.concepts.iter().map(|c| c.0.clone()).collect::<Vec<_>>(),
        );
        ctx.insert("first_concept", &first_concept);
        self.engine.render(TEMPLATE_WELCOME, &ctx)
    }

    pub fn render_next_question_prompt(
        &self,
        concepts_understood: &[ConceptId],
        ctx: &AnalyzerContext<'_>,
        target_concept: &ConceptId,
        question_type: &str,
        difficulty: f64,
    ) -> Result<String, PromptError> {
        let mut tera_ctx = Context::new();
        tera_ctx.insert(
            "concepts_understood",
            &concepts_understood.iter().map(|c| c.0.clone()).collect::<Vec<_>>(),
        );
        tera_ctx.insert(
            "remaining_concepts",
            &ctx.remaining_concepts.iter().map(|c| c.0.clone()).collect::<Vec<_>>(),
        );
        tera_ctx.insert("target_concept", &target_concept.0);
        tera_ctx.insert("question_type", question_type);
        tera_ctx.insert("difficulty", &difficulty);
        self.engine.render(TEMPLATE_NEXT_QUESTION, &tera_ctx)
    }

    pub fn render_feedback_prompt(
        &self,
        student_text: &str,
        understanding_level: &str,
        misconceptions: &[ConceptId],
        hint_needed: bool,
    ) -> Result<String, PromptError> {
        let mut ctx = Context::new();
        ctx.insert("student_text", student_text);
        ctx.insert("understanding_level", understanding_level);
        ctx.insert(
            "misconceptions",
            &misconceptions.iter().map(|c| c.0.clone()).collect::<Vec<_>>(),
        );
        ctx.insert("hint_needed", &hint_needed);
        self.engine.render(TEMPLATE_FEEDBACK, &ctx)
    }

    pub fn render_grade_rationale_prompt(
        &self,
        mastered: &[ConceptId],
        needs_work: &[ConceptId],
        overall_score: f64,
    ) -> Result<String, PromptError> {
        let mut ctx = Context::new();
        ctx.insert("mastered", &mastered.iter().map(|c| c.0.clone()).collect::<Vec<_>>());
        ctx.insert("needs_work", &needs_work.iter().map(|c| c.0.clone()).collect::<Vec<_>>());
        ctx.insert("overall_score", &overall_score);
        self.engine.render(TEMPLATE_GRADE_RATIONALE, &ctx)
    }

    pub fn render_analysis_prompt(
        &self,
        student_text: &str,
        ctx: &AnalyzerContext<'_>,
    ) -> Result<String, PromptError> {
        let mut tera_ctx = Context::new();
        tera_ctx.insert(
            "remaining_concepts",
            &ctx.remaining_concepts.iter().map(|c| c.0.clone()).collect::<Vec<_>>(),
        );
        let recent: Vec<_> = ctx
            .recent_messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();
        tera_ctx.insert("recent_messages", &recent);
        tera_ctx.insert("student_text", student_text);
        self.engine.render(TEMPLATE_ANALYSIS, &tera_ctx)
    }
}
