//! Error types for the course tutor.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application, plus the classification used to turn a pipeline
//! failure into a user-facing apology.

use thiserror::Error;

/// Unified error type for the course tutor.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing credential, missing index, bad YAML)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure, non-success status or malformed body from the
    /// evidence/generation service
    #[error("Transport error: {0}")]
    Transport(String),

    /// Conversation store and settings persistence errors
    #[error("Store error: {0}")]
    Store(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Message fragments that identify an operator-actionable setup problem.
const CONFIGURATION_PATTERNS: &[&str] = &[
    "missing gemini_api_key",
    "missing file_search_store_name",
    "api key not valid",
    "api_key_invalid",
];

/// How a failed orchestration is reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credential or index identifier is missing; the operator must fix setup.
    Configuration,
    /// Anything else; the user may simply retry.
    Transient,
}

impl FailureKind {
    /// Classify an error by variant and by known message substrings.
    pub fn classify(err: &AppError) -> Self {
        if matches!(err, AppError::Config(_)) {
            return Self::Configuration;
        }

        let text = err.to_string().to_lowercase();
        if CONFIGURATION_PATTERNS.iter().any(|p| text.contains(p)) {
            Self::Configuration
        } else {
            Self::Transient
        }
    }

    /// Fixed user-facing message for this failure kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration => {
                "המערכת לא מוגדרת כרגע (מפתח Gemini או File Search). \
                 יש להגדיר את המפתח ואת מאגר הקבצים ואז לנסות שוב."
            }
            Self::Transient => "משהו השתבש בשליפת תשובה מתוך חומרי הקורס. נסו שוב בעוד רגע.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_variant_is_configuration() {
        let err = AppError::Config("anything".to_string());
        assert_eq!(FailureKind::classify(&err), FailureKind::Configuration);
    }

    #[test]
    fn test_missing_key_text_is_configuration() {
        let err = AppError::Other("Missing GEMINI_API_KEY".to_string());
        assert_eq!(FailureKind::classify(&err), FailureKind::Configuration);
    }

    #[test]
    fn test_transport_failure_is_transient() {
        let err = AppError::Transport("Gemini request failed: 503 overloaded".to_string());
        assert_eq!(FailureKind::classify(&err), FailureKind::Transient);
    }

    #[test]
    fn test_messages_differ() {
        assert_ne!(
            FailureKind::Configuration.user_message(),
            FailureKind::Transient.user_message()
        );
    }
}
