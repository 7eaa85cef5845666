//! Normalizer for the event-typed Messages stream.
//!
//! Every content block goes through start, zero or more deltas, then stop. Open blocks
//! live in an index-keyed arena, so interleaved blocks never see each other's deltas.
//! A block is only finalized at its own `content_block_stop`.

use std::collections::{BTreeMap, HashMap};

use crate::error::LLMError;
use crate::provider::normalize::{
    ResultFactory, StreamNormalizer, ToolCallBuilder, assemble_message, parse_payload,
};
use crate::sse::SseEvent;
use crate::types::{
    ChatMessagePart, ChatMessageReasoningData, ChatResult, ChatUsage, Citation, FinishReason,
    TextPart,
};

use super::PROVIDER;
use super::response::{FinishedBlock, convert_stop_reason, split_blocks};
use super::types::{AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent};

#[derive(Debug)]
enum BlockBuilder {
    Text {
        text: String,
        citations: Vec<Citation>,
    },
    Tool(ToolCallBuilder),
    /// Executed by the vendor; the input is tracked but never resolved locally.
    ServerTool,
    Thinking {
        content: String,
        signature: Option<String>,
    },
    Redacted(String),
}

impl BlockBuilder {
    fn open(block: AnthropicContentBlock) -> Option<Self> {
        let builder = match block.kind.as_str() {
            "text" => BlockBuilder::Text {
                text: block.text.unwrap_or_default(),
                citations: block.citations.unwrap_or_default(),
            },
            "tool_use" => {
                let mut call = ToolCallBuilder::default();
                call.absorb(block.id.as_deref(), block.name.as_deref(), None);
                BlockBuilder::Tool(call)
            }
            "server_tool_use" => BlockBuilder::ServerTool,
            "thinking" => BlockBuilder::Thinking {
                content: block.thinking.unwrap_or_default(),
                signature: block.signature.filter(|s| !s.is_empty()),
            },
            "redacted_thinking" => BlockBuilder::Redacted(block.data.unwrap_or_default()),
            other => {
                tracing::debug!(provider = PROVIDER, kind = other, "ignoring unknown block kind");
                return None;
            }
        };
        Some(builder)
    }

    fn finish(self) -> Option<FinishedBlock> {
        let block = match self {
            BlockBuilder::Text { text, citations } => {
                FinishedBlock::Part(ChatMessagePart::Text(TextPart {
                    text,
                    citations,
                    extension: None,
                }))
            }
            // the batch index is assigned once every block is known
            BlockBuilder::Tool(call) => FinishedBlock::Tool(call.finish(0)),
            BlockBuilder::ServerTool => return None,
            BlockBuilder::Thinking { content, signature } => {
                FinishedBlock::Part(ChatMessagePart::Reasoning(ChatMessageReasoningData {
                    content: Some(content),
                    signature,
                    redacted: false,
                }))
            }
            BlockBuilder::Redacted(data) => {
                FinishedBlock::Part(ChatMessagePart::Reasoning(ChatMessageReasoningData {
                    content: Some(data),
                    signature: None,
                    redacted: true,
                }))
            }
        };
        Some(block)
    }
}

pub(crate) struct AnthropicNormalizer {
    factory: ResultFactory,
    open: HashMap<usize, BlockBuilder>,
    finished: BTreeMap<usize, FinishedBlock>,
    usage: Option<ChatUsage>,
    stop_reason: Option<FinishReason>,
    terminated: bool,
}

impl AnthropicNormalizer {
    pub(crate) fn new(endpoint: String) -> Self {
        Self {
            factory: ResultFactory::new(PROVIDER, endpoint),
            open: HashMap::new(),
            finished: BTreeMap::new(),
            usage: None,
            stop_reason: None,
            terminated: false,
        }
    }

    fn absorb_usage(&mut self, usage: ChatUsage) {
        match &mut self.usage {
            Some(current) => current.absorb(&usage),
            None => self.usage = Some(usage),
        }
    }

    fn on_delta(&mut self, index: usize, delta: AnthropicDelta) -> Vec<ChatResult> {
        let Some(builder) = self.open.get_mut(&index) else {
            tracing::debug!(provider = PROVIDER, index, "delta for a block that is not open");
            return Vec::new();
        };

        match (delta.kind.as_str(), builder) {
            ("text_delta", BlockBuilder::Text { text, .. }) => {
                let fragment = delta.text.unwrap_or_default();
                text.push_str(&fragment);
                if fragment.is_empty() {
                    return Vec::new();
                }
                return vec![self.factory.text_delta(0, fragment)];
            }
            ("citations_delta", BlockBuilder::Text { citations, .. }) => {
                if let Some(raw) = delta.citation {
                    let citation = serde_json::from_value(raw).unwrap_or(Citation::Unknown);
                    citations.push(citation);
                }
            }
            ("input_json_delta", BlockBuilder::Tool(call)) => {
                call.absorb(None, None, delta.partial_json.as_deref());
            }
            ("input_json_delta", BlockBuilder::ServerTool) => {}
            ("thinking_delta", BlockBuilder::Thinking { content, .. }) => {
                let fragment = delta.thinking.unwrap_or_default();
                content.push_str(&fragment);
                if fragment.is_empty() {
                    return Vec::new();
                }
                return vec![self.factory.reasoning_delta(0, fragment)];
            }
            ("signature_delta", BlockBuilder::Thinking { signature, .. }) => {
                if let Some(value) = delta.signature {
                    signature.get_or_insert_with(String::new).push_str(&value);
                }
            }
            (kind, _) => {
                tracing::debug!(provider = PROVIDER, index, kind, "ignoring delta");
            }
        }
        Vec::new()
    }

    fn on_stop(&mut self, index: usize) -> Vec<ChatResult> {
        let Some(block) = self.open.remove(&index).and_then(BlockBuilder::finish) else {
            return Vec::new();
        };
        let transient = match &block {
            FinishedBlock::Part(part @ ChatMessagePart::Reasoning(_)) => {
                Some(self.factory.transient_block(0, part.clone()))
            }
            _ => None,
        };
        self.finished.insert(index, block);
        transient.into_iter().collect()
    }

    fn terminal(&mut self) -> Vec<ChatResult> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;
        if !self.open.is_empty() {
            tracing::warn!(
                provider = PROVIDER,
                open = self.open.len(),
                "stream ended with unfinished blocks"
            );
            self.open.clear();
        }

        let finished = std::mem::take(&mut self.finished);
        let (parts, calls) = split_blocks(finished.into_values());
        let message = assemble_message(self.factory.id.clone(), parts, calls);
        vec![
            self.factory
                .append_message(message, self.stop_reason.clone()),
            self.factory
                .finish_metadata(self.usage, self.stop_reason.clone()),
        ]
    }
}

impl StreamNormalizer for AnthropicNormalizer {
    fn on_event(&mut self, event: SseEvent) -> Result<Vec<ChatResult>, LLMError> {
        let Some(payload) = parse_payload::<AnthropicStreamEvent>(PROVIDER, &event) else {
            return Ok(Vec::new());
        };

        let results = match payload {
            AnthropicStreamEvent::MessageStart { message } => {
                self.factory.id = message.id;
                self.factory.model = message.model;
                if let Some(usage) = message.usage {
                    self.absorb_usage(usage.to_usage());
                }
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let mut results = Vec::new();
                let initial_text = content_block
                    .text
                    .clone()
                    .filter(|_| content_block.kind == "text");
                if let Some(builder) = BlockBuilder::open(content_block) {
                    self.open.insert(index, builder);
                }
                if let Some(text) = initial_text.filter(|t| !t.is_empty()) {
                    results.push(self.factory.text_delta(0, text));
                }
                results
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => self.on_delta(index, delta),
            AnthropicStreamEvent::ContentBlockStop { index } => self.on_stop(index),
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref() {
                    self.stop_reason = Some(convert_stop_reason(reason));
                }
                if let Some(usage) = usage {
                    self.absorb_usage(usage.to_usage());
                }
                Vec::new()
            }
            AnthropicStreamEvent::MessageStop => self.terminal(),
            AnthropicStreamEvent::Ping => Vec::new(),
            AnthropicStreamEvent::Error { error } => {
                return Err(LLMError::provider(PROVIDER, error.describe()));
            }
            AnthropicStreamEvent::Unknown => {
                tracing::debug!(provider = PROVIDER, event = ?event.event, "ignoring unknown event");
                Vec::new()
            }
        };
        Ok(results)
    }

    fn finish(&mut self) -> Vec<ChatResult> {
        self.terminal()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::provider::normalize::{run_chunked, summarize};
    use crate::types::StreamTag;

    fn sse(events: &[serde_json::Value]) -> String {
        events
            .iter()
            .map(|event| format!("event: {}\ndata: {}\n\n", event["type"].as_str().unwrap(), event))
            .collect()
    }

    fn start() -> serde_json::Value {
        json!({"type": "message_start", "message": {
            "id": "msg_1", "type": "message", "role": "assistant", "model": "claude-sonnet-4-5",
            "content": [], "usage": {"input_tokens": 25, "output_tokens": 1}
        }})
    }

    fn block_start(index: usize, block: serde_json::Value) -> serde_json::Value {
        json!({"type": "content_block_start", "index": index, "content_block": block})
    }

    fn delta(index: usize, delta: serde_json::Value) -> serde_json::Value {
        json!({"type": "content_block_delta", "index": index, "delta": delta})
    }

    fn stop(index: usize) -> serde_json::Value {
        json!({"type": "content_block_stop", "index": index})
    }

    fn end(reason: &str, output: u64) -> Vec<serde_json::Value> {
        vec![
            json!({"type": "message_delta", "delta": {"stop_reason": reason}, "usage": {"output_tokens": output}}),
            json!({"type": "message_stop"}),
        ]
    }

    fn text_body() -> String {
        let mut events = vec![
            start(),
            block_start(0, json!({"type": "text", "text": ""})),
            json!({"type": "ping"}),
            delta(0, json!({"type": "text_delta", "text": "Hello"})),
            delta(0, json!({"type": "text_delta", "text": ", wörld"})),
            stop(0),
        ];
        events.extend(end("end_turn", 12));
        sse(&events)
    }

    #[tokio::test]
    async fn text_is_chunking_invariant() {
        let body = text_body();
        let whole = run_chunked(AnthropicNormalizer::new("e".into()), &body, body.len()).await;
        for size in [1, 3, 7, 64] {
            let split = run_chunked(AnthropicNormalizer::new("e".into()), &body, size).await;
            assert_eq!(summarize(&split), summarize(&whole), "chunk size {size}");
        }

        let (text, _, message) = summarize(&whole);
        assert_eq!(text, "Hello, wörld");
        assert_eq!(message.content.as_deref(), Some("Hello, wörld"));
        assert_eq!(message.id.as_deref(), Some("msg_1"));
    }

    #[tokio::test]
    async fn terminal_pair_carries_usage_and_reason() {
        let results = run_chunked(AnthropicNormalizer::new("e".into()), &text_body(), 5).await;
        let tail: Vec<_> = results.iter().flatten().rev().take(2).collect();
        assert_eq!(tail[0].tag, StreamTag::FinishMetadata);
        assert_eq!(tail[1].tag, StreamTag::AppendToConversation);

        let usage = tail[0].usage.unwrap();
        assert_eq!(usage.prompt_tokens, 25);
        assert_eq!(usage.completion_tokens, 12);
        assert_eq!(tail[0].finish_reason(), Some(&FinishReason::Stop));
    }

    #[tokio::test]
    async fn interleaved_blocks_stay_isolated() {
        let mut events = vec![
            start(),
            block_start(0, json!({"type": "text", "text": ""})),
            block_start(1, json!({"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {}})),
            delta(0, json!({"type": "text_delta", "text": "Let me "})),
            delta(1, json!({"type": "input_json_delta", "partial_json": "{\"a\":1"})),
            delta(0, json!({"type": "text_delta", "text": "check."})),
            delta(1, json!({"type": "input_json_delta", "partial_json": ",\"b\":2}"})),
            stop(1),
            stop(0),
        ];
        events.extend(end("tool_use", 40));

        let results = run_chunked(AnthropicNormalizer::new("e".into()), &sse(&events), 11).await;
        let (_, _, message) = summarize(&results);
        assert_eq!(message.content.as_deref(), Some("Let me check."));

        let calls = message.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id.as_deref(), Some("toolu_1"));
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(
            serde_json::Value::Object(calls[0].arguments_map().unwrap()),
            json!({"a": 1, "b": 2})
        );
    }

    #[tokio::test]
    async fn signature_after_content_is_kept() {
        let mut events = vec![
            start(),
            block_start(0, json!({"type": "thinking", "thinking": ""})),
            delta(0, json!({"type": "thinking_delta", "thinking": "Two plus "})),
            delta(0, json!({"type": "thinking_delta", "thinking": "two is four."})),
            delta(0, json!({"type": "signature_delta", "signature": "EqQBCgIYAh"})),
            stop(0),
            block_start(1, json!({"type": "text", "text": ""})),
            delta(1, json!({"type": "text_delta", "text": "4"})),
            stop(1),
        ];
        events.extend(end("end_turn", 9));

        let results = run_chunked(AnthropicNormalizer::new("e".into()), &sse(&events), 13).await;
        let transient: Vec<_> = results
            .iter()
            .flatten()
            .filter(|r| r.tag == StreamTag::TransientBlock)
            .collect();
        assert_eq!(transient.len(), 1);

        let (_, reasoning, message) = summarize(&results);
        assert_eq!(reasoning, "Two plus two is four.");
        let block: Vec<_> = message.reasoning().collect();
        assert_eq!(block.len(), 1);
        assert_eq!(block[0].content.as_deref(), Some("Two plus two is four."));
        assert_eq!(block[0].signature.as_deref(), Some("EqQBCgIYAh"));
        assert_eq!(message.content.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn citations_attach_to_their_block() {
        let mut events = vec![
            start(),
            block_start(0, json!({"type": "text", "text": ""})),
            delta(0, json!({"type": "text_delta", "text": "The grass is green."})),
            delta(0, json!({"type": "citations_delta", "citation": {
                "type": "char_location", "cited_text": "grass is green", "document_index": 0,
                "document_title": "Facts", "start_char_index": 0, "end_char_index": 20
            }})),
            delta(0, json!({"type": "citations_delta", "citation": {"type": "hologram_location"}})),
            stop(0),
        ];
        events.extend(end("end_turn", 5));

        let results = run_chunked(AnthropicNormalizer::new("e".into()), &sse(&events), 17).await;
        let (_, _, message) = summarize(&results);
        let parts = message.parts.unwrap();
        let citations = parts[0].citations();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].cited_text(), Some("grass is green"));
        assert_eq!(citations[1], Citation::Unknown);
    }

    #[tokio::test]
    async fn unknown_events_and_garbage_are_skipped() {
        let mut body = sse(&[start(), block_start(0, json!({"type": "text", "text": ""}))]);
        body.push_str("event: mystery\ndata: {\"type\":\"mystery\"}\n\n");
        body.push_str("data: not json\n\n");
        body.push_str(&sse(&[
            block_start(1, json!({"type": "hologram"})),
            delta(1, json!({"type": "text_delta", "text": "lost"})),
            delta(0, json!({"type": "text_delta", "text": "kept"})),
            stop(1),
            stop(0),
        ]));
        body.push_str(&sse(&end("end_turn", 1)));

        let results = run_chunked(AnthropicNormalizer::new("e".into()), &body, 9).await;
        assert!(results.iter().all(Result::is_ok));
        let (text, _, message) = summarize(&results);
        assert_eq!(text, "kept");
        assert_eq!(message.content.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn error_event_fails_the_stream() {
        let body = sse(&[
            start(),
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        ]);
        let results = run_chunked(AnthropicNormalizer::new("e".into()), &body, 8).await;
        match results.last() {
            Some(Err(LLMError::Provider { message, .. })) => assert!(message.contains("Overloaded")),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_message_stop_still_terminates() {
        let body = sse(&[
            start(),
            block_start(0, json!({"type": "text", "text": ""})),
            delta(0, json!({"type": "text_delta", "text": "partial"})),
            stop(0),
            block_start(1, json!({"type": "text", "text": ""})),
            delta(1, json!({"type": "text_delta", "text": " never closed"})),
        ]);
        let results = run_chunked(AnthropicNormalizer::new("e".into()), &body, 4).await;
        let (text, _, message) = summarize(&results);
        assert_eq!(text, "partial never closed");
        assert_eq!(message.content.as_deref(), Some("partial"));
    }
}
