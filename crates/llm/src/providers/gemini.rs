//! Hosted Gemini provider with File Search retrieval.
//!
//! API: `POST {endpoint}/v1beta/{model}:generateContent?key=...`

use crate::client::{GenerateRequest, GenerationClient, RequestPurpose};
use crate::types::{
    ApiErrorBody, Content, GenerateContentBody, GenerateResponse, GenerationParams, Part,
    ThinkingConfig, ToolBlock,
};
use std::time::Duration;
use tutor_core::config::GenerationConfig;
use tutor_core::{AppError, AppResult, GenerationSettings};

const ANSWER_TEMPERATURE: f32 = 0.3;
const GREETING_TEMPERATURE: f32 = 0.75;

/// Error fragments returned when a model rejects the thinking budget field.
const THINKING_CONFIG_ERRORS: &[&str] = &[
    "thinkingconfig",
    "thinking_config",
    "unknown name",
    "invalid json payload",
    "budget 0 is invalid",
    "only works in thinking mode",
];

/// Gemini generation client.
pub struct GeminiClient {
    /// Settings resolved for this request
    settings: GenerationSettings,

    /// Endpoint and budgets
    config: GenerationConfig,

    /// HTTP client
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client. Only a connect timeout is set; a slow call simply
    /// extends request latency.
    pub fn new(settings: GenerationSettings, config: GenerationConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AppError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            config,
            client,
        })
    }

    fn url(&self, model: &str, api_key: &str) -> String {
        format!(
            "{}/v1beta/{}:generateContent?key={}",
            self.config.endpoint.trim_end_matches('/'),
            model,
            api_key
        )
    }

    /// Convert a request into the wire body.
    fn to_body(
        &self,
        request: &GenerateRequest,
        store_name: Option<&str>,
        max_output_tokens: u32,
        disable_thinking: bool,
    ) -> GenerateContentBody {
        let tools = match (&request.retrieval, store_name) {
            (Some(tool), Some(store)) => vec![ToolBlock::file_search(
                tool.dialect,
                store,
                tool.top_k,
                tool.filter.as_deref(),
            )],
            _ => Vec::new(),
        };

        let default_temperature = match request.purpose {
            RequestPurpose::Answer => ANSWER_TEMPERATURE,
            RequestPurpose::Greeting => GREETING_TEMPERATURE,
        };

        GenerateContentBody {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(request.user_text.clone())],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(request.system_instruction.clone())],
            },
            tools,
            generation_config: GenerationParams {
                temperature: request.temperature.unwrap_or(default_temperature),
                max_output_tokens,
                thinking_config: disable_thinking.then_some(ThinkingConfig { thinking_budget: 0 }),
            },
        }
    }

    async fn post(
        &self,
        model: &str,
        api_key: &str,
        body: &GenerateContentBody,
    ) -> AppResult<GenerateResponse> {
        tracing::debug!(model, tools = body.tools.len(), "Sending generateContent request");

        let response = self
            .client
            .post(self.url(model, api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to reach Gemini: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(AppError::Transport(format!(
                "Gemini request failed ({}): {}",
                status, message
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::Transport(format!("Malformed Gemini response: {}", e)))
    }

    /// Send with thinking disabled; re-send without the field if the model rejects it.
    async fn post_with_thinking_fallback(
        &self,
        request: &GenerateRequest,
        model: &str,
        api_key: &str,
        store_name: Option<&str>,
        max_output_tokens: u32,
    ) -> AppResult<GenerateResponse> {
        if request.purpose == RequestPurpose::Greeting {
            let body = self.to_body(request, store_name, max_output_tokens, false);
            return self.post(model, api_key, &body).await;
        }

        let body = self.to_body(request, store_name, max_output_tokens, true);
        match self.post(model, api_key, &body).await {
            Err(err) if is_thinking_config_error(&err) => {
                tracing::warn!(model, "Model rejected thinkingConfig, retrying without it");
                let body = self.to_body(request, store_name, max_output_tokens, false);
                self.post(model, api_key, &body).await
            }
            other => other,
        }
    }
}

/// Whether the API rejected the request because of the thinking budget field.
pub fn is_thinking_config_error(err: &AppError) -> bool {
    let text = err.to_string().to_lowercase();
    THINKING_CONFIG_ERRORS.iter().any(|p| text.contains(p))
}

#[async_trait::async_trait]
impl GenerationClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse> {
        let (api_key, store_name, model, budget) = match request.purpose {
            RequestPurpose::Answer => {
                let (key, store) = self.settings.require_retrieval()?;
                let budget = request
                    .max_output_tokens
                    .unwrap_or(self.config.answer_max_output_tokens);
                (key, Some(store), self.settings.retrieval_model.as_str(), budget)
            }
            RequestPurpose::Greeting => {
                let key = self
                    .settings
                    .api_key
                    .as_deref()
                    .ok_or_else(|| AppError::Config("Missing GEMINI_API_KEY".to_string()))?;
                let budget = request
                    .max_output_tokens
                    .unwrap_or(self.config.greeting_max_output_tokens);
                (key, None, self.settings.greeting_model.as_str(), budget)
            }
        };

        let primary = self
            .post_with_thinking_fallback(request, model, api_key, store_name, budget)
            .await?;

        if request.purpose == RequestPurpose::Greeting || !primary.looks_like_empty_thoughts() {
            return Ok(primary);
        }

        let fallback_model = self.config.fallback_model.as_str();
        let fallback_budget = budget.max(self.config.fallback_min_output_tokens);
        tracing::warn!(
            model,
            fallback_model,
            fallback_budget,
            "Empty MAX_TOKENS response with thoughts, retrying with fallback model"
        );

        match self
            .post_with_thinking_fallback(request, fallback_model, api_key, store_name, fallback_budget)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!("Fallback model call failed, keeping primary response: {}", e);
                Ok(primary)
            }
        }
    }
}
