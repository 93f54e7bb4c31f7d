//! The LLM provider contract: an opaque text-completion and embedding
//! service. Every call is wrapped by a caller-side parser with a
//! deterministic fallback (see `analysis`, `prompt`, `grade`) — the LLM's
//! non-determinism never leaks past that boundary.

mod http;
mod scripted;

pub use http::HttpLlmClient;
pub use scripted::ScriptedLlmClient;

use async_trait::async_trait;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String, LlmError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}
