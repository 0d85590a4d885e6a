//! Command handlers for the course tutor CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod settings;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use settings::SettingsCommand;
