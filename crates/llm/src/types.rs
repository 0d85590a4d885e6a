//! Wire types of the hosted generateContent API.
//!
//! The retrieval tool block exists in two field-naming dialects. Both are
//! modelled explicitly through [`ToolDialect`] and [`ToolBlock`]; responses
//! accept either spelling through serde aliases so a single normalization
//! pass can read them.

use serde::{Deserialize, Serialize};

/// Field-naming convention used for the File Search tool block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDialect {
    /// `fileSearch { fileSearchStoreNames, topK, metadataFilter }`
    Camel,
    /// `file_search { file_search_store_names, top_k, metadata_filter }`
    Snake,
}

impl ToolDialect {
    /// The dialect tried first.
    pub const PRIMARY: ToolDialect = ToolDialect::Camel;

    /// The other dialect.
    pub fn alternate(self) -> Self {
        match self {
            Self::Camel => Self::Snake,
            Self::Snake => Self::Camel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camel => "camel",
            Self::Snake => "snake",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CamelFileSearch {
    pub file_search_store_names: Vec<String>,
    pub top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnakeFileSearch {
    pub file_search_store_names: Vec<String>,
    pub top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_filter: Option<String>,
}

/// One entry of the request's `tools` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ToolBlock {
    #[serde(rename = "fileSearch")]
    Camel(CamelFileSearch),
    #[serde(rename = "file_search")]
    Snake(SnakeFileSearch),
}

impl ToolBlock {
    /// Build the tool block for a store in the requested dialect.
    pub fn file_search(
        dialect: ToolDialect,
        store_name: &str,
        top_k: u32,
        metadata_filter: Option<&str>,
    ) -> Self {
        let names = vec![store_name.to_string()];
        let filter = metadata_filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);

        match dialect {
            ToolDialect::Camel => Self::Camel(CamelFileSearch {
                file_search_store_names: names,
                top_k,
                metadata_filter: filter,
            }),
            ToolDialect::Snake => Self::Snake(SnakeFileSearch {
                file_search_store_names: names,
                top_k,
                metadata_filter: filter,
            }),
        }
    }
}

/// A text part of a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Set on reasoning parts by thinking models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: None,
        }
    }
}

/// A message: role plus parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Request body of `models/{model}:generateContent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody {
    pub contents: Vec<Content>,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolBlock>,
    pub generation_config: GenerationParams,
}

/// Response of `generateContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default, alias = "usage_metadata")]
    pub usage_metadata: UsageMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,

    #[serde(default, alias = "finish_reason")]
    pub finish_reason: Option<String>,

    #[serde(default, alias = "grounding_metadata")]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default, alias = "grounding_chunks")]
    pub grounding_chunks: Vec<GroundingChunk>,

    #[serde(default, alias = "grounding_supports")]
    pub grounding_supports: Vec<GroundingSupport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    #[serde(default, alias = "retrieved_context")]
    pub retrieved_context: Option<RetrievedContext>,
}

/// Metadata of one retrieved passage. Which name fields are filled varies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "display_name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "file_name")]
    pub file_name: Option<String>,
    #[serde(default, alias = "document_title")]
    pub document_title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "file_search_store")]
    pub file_search_store: Option<String>,
}

impl RetrievedContext {
    /// Context with a title and passage text.
    pub fn titled(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Candidate source labels in priority order.
    pub fn label_candidates(&self) -> impl Iterator<Item = &str> {
        [
            &self.title,
            &self.display_name,
            &self.file_name,
            &self.document_title,
            &self.name,
            &self.uri,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref())
        .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSupport {
    #[serde(default)]
    pub segment: Option<Segment>,

    #[serde(default, alias = "grounding_chunk_indices")]
    pub grounding_chunk_indices: Vec<u32>,
}

/// Character span of the answer text backed by evidence.
///
/// Zero-valued offsets are omitted on the wire, so a missing start means 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(default, alias = "start_index")]
    pub start_index: Option<i64>,
    #[serde(default, alias = "end_index")]
    pub end_index: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default, alias = "prompt_token_count")]
    pub prompt_token_count: u32,
    #[serde(default, alias = "candidates_token_count")]
    pub candidates_token_count: u32,
    #[serde(default, alias = "thoughts_token_count")]
    pub thoughts_token_count: u32,
    #[serde(default, alias = "total_token_count")]
    pub total_token_count: u32,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GenerateResponse {
    /// Response whose single candidate carries `text` and nothing else.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part::text(text)],
                }),
                finish_reason: Some("STOP".to_string()),
                grounding_metadata: None,
            }],
            usage_metadata: UsageMetadata::default(),
        }
    }

    /// Append a retrieved chunk to the first candidate.
    pub fn with_chunk(mut self, context: RetrievedContext) -> Self {
        self.metadata_mut().grounding_chunks.push(GroundingChunk {
            retrieved_context: Some(context),
        });
        self
    }

    /// Append a supporting span `[start, end)` to the first candidate.
    pub fn with_support(mut self, start: i64, end: i64) -> Self {
        self.metadata_mut().grounding_supports.push(GroundingSupport {
            segment: Some(Segment {
                start_index: Some(start),
                end_index: Some(end),
                text: None,
            }),
            grounding_chunk_indices: vec![0],
        });
        self
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        if let Some(candidate) = self.candidates.first_mut() {
            candidate.finish_reason = Some(reason.into());
        }
        self
    }

    fn metadata_mut(&mut self) -> &mut GroundingMetadata {
        if self.candidates.is_empty() {
            self.candidates.push(Candidate::default());
        }
        self.candidates[0]
            .grounding_metadata
            .get_or_insert_with(GroundingMetadata::default)
    }

    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Concatenated, trimmed non-thought text of the first candidate.
    pub fn text(&self) -> String {
        self.first_candidate()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    pub fn finish_reason(&self) -> &str {
        self.first_candidate()
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("")
    }

    pub fn grounding(&self) -> Option<&GroundingMetadata> {
        self.first_candidate()
            .and_then(|c| c.grounding_metadata.as_ref())
    }

    /// Whether any retrieved chunk or supporting span came back.
    pub fn has_grounding_evidence(&self) -> bool {
        self.grounding()
            .map(|g| !g.grounding_chunks.is_empty() || !g.grounding_supports.is_empty())
            .unwrap_or(false)
    }

    /// A thinking model spent the whole output budget on reasoning.
    pub fn looks_like_empty_thoughts(&self) -> bool {
        self.text().is_empty()
            && self.finish_reason() == "MAX_TOKENS"
            && self.usage_metadata.thoughts_token_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_block_dialects_serialize_differently() {
        let camel = ToolBlock::file_search(ToolDialect::Camel, "fileSearchStores/s", 10, Some("week=\"03\""));
        let snake = ToolBlock::file_search(ToolDialect::Snake, "fileSearchStores/s", 10, None);

        assert_eq!(
            serde_json::to_value(&camel).unwrap(),
            json!({"fileSearch": {
                "fileSearchStoreNames": ["fileSearchStores/s"],
                "topK": 10,
                "metadataFilter": "week=\"03\""
            }})
        );
        assert_eq!(
            serde_json::to_value(&snake).unwrap(),
            json!({"file_search": {
                "file_search_store_names": ["fileSearchStores/s"],
                "top_k": 10
            }})
        );
    }

    #[test]
    fn test_blank_filter_is_omitted() {
        let block = ToolBlock::file_search(ToolDialect::Camel, "s", 5, Some("  "));
        let value = serde_json::to_value(&block).unwrap();
        assert!(value["fileSearch"].get("metadataFilter").is_none());
    }

    #[test]
    fn test_dialect_alternates() {
        assert_eq!(ToolDialect::PRIMARY.alternate(), ToolDialect::Snake);
        assert_eq!(ToolDialect::Snake.alternate(), ToolDialect::Camel);
    }

    #[test]
    fn test_response_accepts_snake_case_metadata() {
        let raw = json!({
            "candidates": [{
                "content": {"parts": [{"text": "answer"}]},
                "finish_reason": "STOP",
                "grounding_metadata": {
                    "grounding_chunks": [{"retrieved_context": {"display_name": "Week03.pdf", "text": "q"}}],
                    "grounding_supports": [{"segment": {"end_index": 4}}]
                }
            }],
            "usage_metadata": {"thoughts_token_count": 3}
        });
        let response: GenerateResponse = serde_json::from_value(raw).unwrap();

        let grounding = response.grounding().unwrap();
        assert_eq!(grounding.grounding_chunks.len(), 1);
        assert_eq!(grounding.grounding_supports.len(), 1);
        assert_eq!(response.finish_reason(), "STOP");
        assert_eq!(response.usage_metadata.thoughts_token_count, 3);
        assert!(response.has_grounding_evidence());
    }

    #[test]
    fn test_text_skips_thought_parts() {
        let raw = json!({
            "candidates": [{"content": {"parts": [
                {"text": "thinking...", "thought": true},
                {"text": " Hello "},
                {"text": "world"}
            ]}}]
        });
        let response: GenerateResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.text(), "Hello world");
    }

    #[test]
    fn test_empty_thoughts_detection() {
        let mut response = GenerateResponse::from_text("").with_finish_reason("MAX_TOKENS");
        assert!(!response.looks_like_empty_thoughts());

        response.usage_metadata.thoughts_token_count = 200;
        assert!(response.looks_like_empty_thoughts());

        let answered = GenerateResponse::from_text("ok").with_finish_reason("MAX_TOKENS");
        assert!(!answered.looks_like_empty_thoughts());
    }

    #[test]
    fn test_empty_response_has_no_evidence() {
        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(!response.has_grounding_evidence());
        assert_eq!(response.text(), "");
    }
}
