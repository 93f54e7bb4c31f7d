//! Deterministic prompt rendering: every prompt is a pure function of a
//! typed context, never of ambient session state directly.

mod builder;
mod engine;

pub use builder::PromptBuilder;
pub use engine::TeraEngine;
