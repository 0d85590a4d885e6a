//! Answer pipeline types.

use crate::orchestrator::OrchestrationTrace;
use serde::{Deserialize, Serialize};
use tutor_llm::UsageMetadata;

/// Label used when a reference carries neither week nor part.
pub const DEFAULT_REFERENCE_LABEL: &str = "מקור מתוך File Search";

/// A source reference derived from retrieved-chunk metadata.
///
/// Serialized as the citation objects of the meta event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Display label, e.g. "שבוע 03 - Week03_Kant.pdf p.4"
    pub label: String,

    /// Week label, e.g. "שבוע 03"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<String>,

    /// Source name plus optional page marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,

    /// Excerpt, at most 180 characters plus an ellipsis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

impl Reference {
    /// Build a reference, deriving the label from week and part.
    pub fn new(week: Option<String>, part: Option<String>, quote: Option<String>) -> Self {
        let label = [week.as_deref(), part.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" - ");
        let label = if label.is_empty() {
            DEFAULT_REFERENCE_LABEL.to_string()
        } else {
            label
        };

        Self {
            label,
            week,
            part,
            quote,
        }
    }
}

/// Evidence statistics of one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingStats {
    pub chunks_count: usize,
    pub supports_count: usize,

    /// Characters covered by the union of supporting spans
    pub supported_chars: usize,

    /// `supported_chars / raw text length`, in `[0, 1]`
    pub coverage: f64,
}

/// Normalized view of one generation call's output.
///
/// Derived from a single response and never merged with another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    /// Cleaned answer text
    pub answer: String,

    /// De-duplicated references, first-seen order
    pub references: Vec<Reference>,

    pub grounding: GroundingStats,

    /// Model text before extraction and cleanup
    pub raw_text: String,

    /// The model replied with the not-found sentinel
    pub not_found: bool,

    pub finish_reason: String,
    pub usage: UsageMetadata,
}

/// Caller-facing grounding verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingStatus {
    Grounded,
    Weak,
    NotFound,
    NotApplicable,
}

impl GroundingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grounded => "grounded",
            Self::Weak => "weak",
            Self::NotFound => "not_found",
            Self::NotApplicable => "not_applicable",
        }
    }
}

/// One question submitted to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    /// Conversation key; a new one is generated when absent
    pub session_id: Option<String>,

    pub question: String,

    /// Caller-supplied week hint
    pub week: Option<String>,

    /// Caller-supplied document-type hint
    pub doc_type: Option<String>,

    /// Attach the orchestration trace to the outcome
    pub debug: bool,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            session_id: None,
            question: question.into(),
            week: None,
            doc_type: None,
            debug: false,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_week(mut self, week: impl Into<String>) -> Self {
        self.week = Some(week.into());
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Final result of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskOutcome {
    pub answer: String,
    pub grounding_status: GroundingStatus,
    pub citations: Vec<Reference>,
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,

    /// Per-attempt diagnostics, present when debug was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<OrchestrationTrace>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_label_from_week_and_part() {
        let reference = Reference::new(
            Some("שבוע 03".to_string()),
            Some("Week03_Kant.pdf p.4".to_string()),
            None,
        );
        assert_eq!(reference.label, "שבוע 03 - Week03_Kant.pdf p.4");
    }

    #[test]
    fn test_reference_label_default() {
        let reference = Reference::new(None, None, Some("קטע".to_string()));
        assert_eq!(reference.label, DEFAULT_REFERENCE_LABEL);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let value = serde_json::to_value(GroundingStatus::NotApplicable).unwrap();
        assert_eq!(value, "not_applicable");
        assert_eq!(GroundingStatus::Weak.as_str(), "weak");
    }
}
