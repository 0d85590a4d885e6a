//! Prompt system for the course tutor.
//!
//! This crate provides:
//! - A built-in instruction profile, overridable from YAML
//! - Handlebars rendering of the user text block
//! - Answer and greeting prompt variants

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_answer_prompt, build_greeting_prompt, format_history};
pub use loader::{load_profile, load_profile_or_default, validate_profile};
pub use types::{
    GreetingRules, PromptPayload, PromptProfile, PromptVariant, TranscriptLabels,
    NOT_FOUND_SENTINEL,
};
