//! Grounded question answering over course materials.
//!
//! Classifies a question, rewrites follow-ups, runs up to three retrieval
//! attempts against the hosted File Search tool and keeps the answer only
//! when it is grounded in the retrieved material.

pub mod classifier;
pub mod cleanup;
pub mod context;
pub mod grounding;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod replies;
pub mod store;
pub mod stream;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use classifier::{Intent, PatternClassifier, QuestionClassifier};
pub use grounding::{GroundingDecision, GroundingPolicy, GroundingReason};
pub use orchestrator::{OrchestrationTrace, RetrievalOrchestrator, RetrievalPlan};
pub use pipeline::AskService;
pub use store::{AnalyticsEvent, AnalyticsSink, ConversationStore, LastGrounded, MemoryStore, SqliteStore};
pub use stream::{sse_stream, stream_answer, StreamEvent, StreamMeta, StreamOptions};
pub use types::{AskOutcome, AskRequest, GroundingStatus, ParsedResponse, Reference};
