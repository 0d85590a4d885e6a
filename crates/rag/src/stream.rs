//! Incremental delivery of a finished answer.
//!
//! An answer is replayed as a sequence of [`StreamEvent`]s: text chunks,
//! one metadata event, then a terminator. Events are produced by a spawned
//! task into a bounded channel, so a consumer that goes away stops the
//! producer at its next send.

use crate::orchestrator::OrchestrationTrace;
use crate::types::{AskOutcome, GroundingStatus, Reference};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tutor_core::AppResult;

/// Characters per chunk event.
pub const DEFAULT_CHUNK_CHARS: usize = 60;

/// Pause between chunk events.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(12);

/// Terminator frame payload.
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDebug {
    pub diag: OrchestrationTrace,
}

/// Metadata sent once after the last chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamMeta {
    pub grounding_status: GroundingStatus,
    pub citations: Vec<Reference>,
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<StreamDebug>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_output_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_thoughts_tokens: Option<u32>,
}

impl StreamMeta {
    pub fn from_outcome(outcome: &AskOutcome) -> Self {
        Self {
            grounding_status: outcome.grounding_status,
            citations: outcome.citations.clone(),
            session_id: outcome.session_id.clone(),
            debug: outcome
                .trace
                .clone()
                .map(|diag| StreamDebug { diag }),
            gemini_finish_reason: outcome.finish_reason.clone(),
            gemini_output_tokens: outcome.usage.as_ref().map(|u| u.candidates_token_count),
            gemini_thoughts_tokens: outcome.usage.as_ref().map(|u| u.thoughts_token_count),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Chunk { value: String },
    Meta(StreamMeta),
    Done,
}

impl StreamEvent {
    /// Encode as one server-sent-events frame.
    pub fn to_sse(&self) -> AppResult<String> {
        let payload = match self {
            Self::Done => DONE_MARKER.to_string(),
            event => serde_json::to_string(event)?,
        };
        Ok(format!("data: {}\n\n", payload))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    pub chunk_chars: usize,
    pub delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_CHARS,
            delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

/// Split `text` into pieces of at most `chunk_chars` characters.
///
/// An empty text still yields one empty chunk.
pub fn split_chunks(text: &str, chunk_chars: usize) -> Vec<String> {
    let size = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// Receiving end of a streamed answer.
pub struct AnswerStream {
    pub events: mpsc::Receiver<StreamEvent>,

    /// Resolves to the number of events handed to the channel
    pub producer: JoinHandle<usize>,
}

/// Replay `outcome` as chunk events, one meta event and a terminator.
pub fn stream_answer(outcome: AskOutcome, options: StreamOptions) -> AnswerStream {
    let (tx, rx) = mpsc::channel(1);

    let producer = tokio::spawn(async move {
        let chunks = split_chunks(&outcome.answer, options.chunk_chars);
        let last_chunk = chunks.len() - 1;
        let mut sent = 0;

        for (i, value) in chunks.into_iter().enumerate() {
            if tx.send(StreamEvent::Chunk { value }).await.is_err() {
                tracing::debug!(sent, "Stream consumer went away");
                return sent;
            }
            sent += 1;
            if i < last_chunk && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
        }

        for event in [StreamEvent::Meta(StreamMeta::from_outcome(&outcome)), StreamEvent::Done] {
            if tx.send(event).await.is_err() {
                tracing::debug!(sent, "Stream consumer went away");
                return sent;
            }
            sent += 1;
        }

        sent
    });

    AnswerStream {
        events: rx,
        producer,
    }
}

/// Adapt an event channel into a stream of SSE frames.
pub fn sse_stream(events: mpsc::Receiver<StreamEvent>) -> impl Stream<Item = AppResult<String>> {
    futures::stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        Some((event.to_sse(), events))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::Value;

    fn outcome(answer: &str) -> AskOutcome {
        AskOutcome {
            answer: answer.to_string(),
            grounding_status: GroundingStatus::Grounded,
            citations: vec![Reference::new(Some("שבוע 01".to_string()), None, None)],
            session_id: "s1".to_string(),
            finish_reason: Some("STOP".to_string()),
            usage: None,
            trace: None,
        }
    }

    fn fast() -> StreamOptions {
        StreamOptions {
            chunk_chars: 4,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_split_chunks_on_char_boundaries() {
        assert_eq!(split_chunks("שלום עולם", 4), ["שלום", " עול", "ם"]);
        assert_eq!(split_chunks("", 60), [""]);
        assert_eq!(split_chunks("abc", 0), ["a", "b", "c"]);
    }

    #[test]
    fn test_event_frames() {
        let chunk = StreamEvent::Chunk {
            value: "hi".to_string(),
        };
        assert_eq!(chunk.to_sse().unwrap(), "data: {\"type\":\"chunk\",\"value\":\"hi\"}\n\n");
        assert_eq!(StreamEvent::Done.to_sse().unwrap(), "data: [DONE]\n\n");

        let meta = StreamEvent::Meta(StreamMeta::from_outcome(&outcome("x")));
        let frame = meta.to_sse().unwrap();
        let json: Value = serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(json["type"], "meta");
        assert_eq!(json["groundingStatus"], "grounded");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["geminiFinishReason"], "STOP");
        assert_eq!(json["citations"][0]["label"], "שבוע 01");
        assert!(json.get("debug").is_none());
    }

    #[tokio::test]
    async fn test_stream_answer_order() {
        let mut stream = stream_answer(outcome("abcdefghij"), fast());

        let mut events = Vec::new();
        while let Some(event) = stream.events.recv().await {
            events.push(event);
        }

        assert_eq!(stream.producer.await.unwrap(), 5);
        let values: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { value } => Some(value.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(values.concat(), "abcdefghij");
        assert!(matches!(events[3], StreamEvent::Meta(_)));
        assert_eq!(events[4], StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_empty_answer_still_streams_meta() {
        let stream = stream_answer(outcome(""), fast());
        let frames: Vec<_> = sse_stream(stream.events).collect().await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref().unwrap(), "data: {\"type\":\"chunk\",\"value\":\"\"}\n\n");
        assert_eq!(frames[2].as_ref().unwrap(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_dropped_consumer_stops_producer() {
        let long_answer = "x".repeat(600);
        let options = StreamOptions {
            chunk_chars: 10,
            delay: Duration::from_millis(5),
        };
        let mut stream = stream_answer(outcome(&long_answer), options);

        let first = stream.events.recv().await;
        assert!(matches!(first, Some(StreamEvent::Chunk { .. })));
        drop(stream.events);

        let sent = stream.producer.await.unwrap();
        assert!(sent <= 2, "producer kept going after drop: {}", sent);
    }
}
