//! Generation client abstraction and request types.
//!
//! One call to [`GenerationClient::generate`] is one call to the hosted
//! evidence/generation capability.

use crate::types::{GenerateResponse, ToolDialect};
use serde::{Deserialize, Serialize};
use tutor_core::AppResult;

/// What the call is for; selects model, temperature and budget defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    /// Retrieval-grounded answer
    Answer,
    /// Short welcoming reply, no retrieval
    Greeting,
}

/// Retrieval tool attached to an answer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTool {
    /// Retrieval breadth
    pub top_k: u32,

    /// Metadata filter expression, e.g. `week="03"`
    pub filter: Option<String>,

    /// Field-naming dialect of the tool block
    pub dialect: ToolDialect,
}

/// Generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub purpose: RequestPurpose,

    /// Instruction text (persona, grounding and format rules)
    pub system_instruction: String,

    /// User-facing text block
    pub user_text: String,

    /// Retrieval tool; absent for greetings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalTool>,

    /// Output token budget; the client default applies when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature; the client default applies when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    /// Create an answer request without a retrieval tool.
    pub fn answer(system_instruction: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            purpose: RequestPurpose::Answer,
            system_instruction: system_instruction.into(),
            user_text: user_text.into(),
            retrieval: None,
            max_output_tokens: None,
            temperature: None,
        }
    }

    /// Create a greeting request.
    pub fn greeting(system_instruction: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            purpose: RequestPurpose::Greeting,
            ..Self::answer(system_instruction, user_text)
        }
    }

    /// Attach a retrieval tool.
    pub fn with_retrieval(mut self, top_k: u32, filter: Option<&str>, dialect: ToolDialect) -> Self {
        self.retrieval = Some(RetrievalTool {
            top_k,
            filter: filter.map(str::to_string),
            dialect,
        });
        self
    }

    /// Set the output token budget.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Trait for evidence/generation providers.
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    /// Get the provider name (e.g., "gemini").
    fn provider_name(&self) -> &str;

    /// Perform one generation call.
    ///
    /// Network failures, non-success statuses and malformed bodies are
    /// returned as errors; the caller decides how to report them.
    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse>;
}
