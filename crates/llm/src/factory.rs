//! Generation provider factory.
//!
//! Creates the client for the configured provider from settings resolved
//! for the current request.

use crate::client::GenerationClient;
use crate::providers::GeminiClient;
use std::sync::Arc;
use tutor_core::config::GenerationConfig;
use tutor_core::{AppError, AppResult, GenerationSettings};

/// Default provider identifier.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Create a generation client based on the provider name.
///
/// Missing credentials are not rejected here: the client reports them on
/// the first call so the pipeline can turn them into a configuration message.
pub fn create_client(
    provider: &str,
    settings: GenerationSettings,
    config: &GenerationConfig,
) -> AppResult<Arc<dyn GenerationClient>> {
    match provider.to_lowercase().as_str() {
        "gemini" | "google" => Ok(Arc::new(GeminiClient::new(settings, config.clone())?)),
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
