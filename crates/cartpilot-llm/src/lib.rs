//! Language-model collaborator for the orchestrator's fallback path.
//!
//! The model sees a [`cartpilot_core::PageSnapshot`] and answers with one
//! JSON decision. Its text is never trusted to be clean JSON: everything goes
//! through [`recover_json`] before [`Decision::from_value`] reads it.

pub mod client;
pub mod decision;
pub mod error;
pub mod prompt;
pub mod recovery;

pub use client::{GeminiClient, LanguageModel};
pub use decision::{parse_decision, Decision, ModelDecision};
pub use error::LlmError;
pub use prompt::{build_decision_prompt, SYSTEM_INSTRUCTION};
pub use recovery::recover_json;
