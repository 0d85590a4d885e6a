//! Course Tutor Core Library
//!
//! This crate provides the foundational utilities shared by the tutor crates:
//! - Error handling (`AppError`, `AppResult`, `FailureKind`)
//! - Logging infrastructure
//! - Configuration management and per-request settings resolution
//! - Conversation turn types

pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, GenerationSettings, SettingsProvider};
pub use conversation::{ConversationTurn, Role};
pub use error::{AppError, AppResult, FailureKind};
