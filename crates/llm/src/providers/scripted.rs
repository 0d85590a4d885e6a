//! Scripted provider for tests and offline runs.

use crate::client::{GenerateRequest, GenerationClient};
use crate::types::GenerateResponse;
use std::collections::VecDeque;
use std::sync::Mutex;
use tutor_core::{AppError, AppResult};

/// Replays queued results in order and records every request it receives.
///
/// Running out of queued results is reported as an error so tests notice
/// an unexpected extra call.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    results: Mutex<VecDeque<AppResult<GenerateResponse>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_response(self, response: GenerateResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: AppError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, result: AppResult<GenerateResponse>) {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(result);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl GenerationClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse> {
        self.requests
            .lock()
            .map_err(|_| AppError::Other("scripted client lock poisoned".to_string()))?
            .push(request.clone());

        self.results
            .lock()
            .map_err(|_| AppError::Other("scripted client lock poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::Other(
                    "scripted client has no response left".to_string(),
                ))
            })
    }
}
