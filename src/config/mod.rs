//! Server-side configuration: bind address, database location, LLM
//! endpoint. Distinct from `domain::AssessmentConfig`, which describes one
//! assessment and is supplied per-session by the surrounding LMS launch.

use serde::Deserialize;

use crate::error::{CacError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub database_path: String,
    pub llm: LlmConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrityConfig {
    #[serde(default = "default_warn_at")]
    pub warn_at: f64,
    #[serde(default = "default_flag_at")]
    pub flag_at: f64,
    #[serde(default = "default_block_at")]
    pub block_at: f64,
    #[serde(default = "default_global_rate_per_hour")]
    pub global_rate_per_hour: u32,
    #[serde(default = "default_session_rate_per_hour")]
    pub session_rate_per_hour: u32,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            warn_at: default_warn_at(),
            flag_at: default_flag_at(),
            block_at: default_block_at(),
            global_rate_per_hour: default_global_rate_per_hour(),
            session_rate_per_hour: default_session_rate_per_hour(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> String {
    "sqlite://cac.db".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_warn_at() -> f64 {
    0.3
}
fn default_flag_at() -> f64 {
    0.6
}
fn default_block_at() -> f64 {
    0.85
}
fn default_global_rate_per_hour() -> u32 {
    5000
}
fn default_session_rate_per_hour() -> u32 {
    60
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CacError::ConfigInvalid(format!("cannot read {path}: {e}")))?;
        toml::from_str(&raw).map_err(|e| CacError::ConfigInvalid(format!("invalid config at {path}: {e}")))
    }
}
