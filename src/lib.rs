#![warn(clippy::all, clippy::pedantic)]
#![allow(
    async_fn_in_trait,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

// ── Core domain model ────────────────────────────────────────────────────────
pub mod domain;
pub mod error;

// ── Pure decision/analysis layers ────────────────────────────────────────────
pub mod analysis;
pub mod integrity;
pub mod mastery;
pub mod policy;

// ── External-facing services ─────────────────────────────────────────────────
pub mod grade;
pub mod llm;
pub mod prompt;

// ── Orchestration and persistence ────────────────────────────────────────────
pub mod actor;
pub mod engine;
pub mod store;

// ── Adapters ──────────────────────────────────────────────────────────────────
pub mod config;
pub mod gateway;

pub use error::{CacError, Result};
