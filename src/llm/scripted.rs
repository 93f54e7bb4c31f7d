use async_trait::async_trait;
use std::sync::Mutex;

use super::{GenerateOptions, LlmClient};
use crate::error::LlmError;

/// Deterministic, no-network test double. Returns scripted completions in
/// order; once exhausted, repeats the last entry so tests that call
/// `generate` more times than scripted don't panic mid-flow.
pub struct ScriptedLlmClient {
    script: Mutex<Vec<String>>,
    calls: Mutex<usize>,
}

impl ScriptedLlmClient {
    #[must_use]
    pub fn new(script: Vec<impl Into<String>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Into::into).collect()),
            calls: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("scripted llm mutex poisoned")
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String, LlmError> {
        let script = self.script.lock().expect("scripted llm mutex poisoned");
        let mut calls = self.calls.lock().expect("scripted llm mutex poisoned");
        let idx = (*calls).min(script.len().saturating_sub(1));
        *calls += 1;
        script
            .get(idx)
            .cloned()
            .ok_or_else(|| LlmError::Request("scripted client has no entries".into()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        // Deterministic pseudo-embedding: byte-length-derived, stable across calls.
        Ok(vec![(text.len() % 97) as f32 / 97.0; 8])
    }
}
