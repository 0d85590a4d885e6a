//! Evidence/generation integration crate for the course tutor.
//!
//! This crate wraps the hosted generateContent API with File Search
//! retrieval behind a provider-agnostic trait.
//!
//! # Providers
//! - **Gemini**: hosted generation with File Search (default)
//! - **Scripted**: replays canned responses, used by tests
//!
//! # Example
//! ```no_run
//! use tutor_llm::{GenerateRequest, GenerationClient, ScriptedClient, GenerateResponse, ToolDialect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ScriptedClient::new().with_response(GenerateResponse::from_text("NOT_FOUND"));
//! let request = GenerateRequest::answer("system", "what is utilitarianism?")
//!     .with_retrieval(10, None, ToolDialect::Camel);
//! let response = client.generate(&request).await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{GenerateRequest, GenerationClient, RequestPurpose, RetrievalTool};
pub use factory::{create_client, DEFAULT_PROVIDER};
pub use providers::{GeminiClient, ScriptedClient};
pub use types::{GenerateResponse, GroundingMetadata, RetrievedContext, ToolDialect, UsageMetadata};
