//! Glue between the SSE decoder and the per-vendor stream normalizers.
//!
//! A normalizer is a synchronous state machine: it consumes one [`SseEvent`] at a time
//! and returns zero or more [`ChatResult`]s. [`NormalizedStream`] drives it from an
//! [`SseDecoder`], so ordering is exactly arrival order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::sse::{SseDecoder, SseEvent, SseItem};
use crate::types::{
    ChatChoice, ChatMessage, ChatMessagePart, ChatMessageReasoningData, ChatResult, ChatRole,
    ChatUsage, FinishReason, ProviderMetadata, StreamTag, ToolCall,
};

use super::ChatStream;

/// Per-vendor translation of decoded events into normalized results.
pub(crate) trait StreamNormalizer: Send + Unpin + 'static {
    /// Handles one event. An `Err` is a vendor-reported failure and ends the stream.
    fn on_event(&mut self, event: SseEvent) -> Result<Vec<ChatResult>, LLMError>;

    /// Called once at `[DONE]` or end of body. Emits whatever the vendor never closed.
    fn finish(&mut self) -> Vec<ChatResult>;
}

/// Wraps a normalizer and decoder into a [`ChatStream`].
pub(crate) fn normalized_stream<N: StreamNormalizer>(
    body: HttpBodyStream,
    provider: &'static str,
    normalizer: N,
    cancel: &CancellationToken,
) -> ChatStream {
    Box::pin(NormalizedStream {
        decoder: SseDecoder::new(body, provider).with_cancellation(cancel.clone()),
        normalizer,
        cancel: cancel.clone(),
        pending: VecDeque::new(),
        provider,
        saw_event: false,
        finished: false,
    })
}

pub(crate) struct NormalizedStream<N> {
    decoder: SseDecoder,
    normalizer: N,
    cancel: CancellationToken,
    pending: VecDeque<Result<ChatResult, LLMError>>,
    provider: &'static str,
    saw_event: bool,
    finished: bool,
}

impl<N: StreamNormalizer> NormalizedStream<N> {
    fn close(&mut self) {
        self.finished = true;
        if self.cancel.is_cancelled() {
            // partial blocks are dropped on cancellation
            return;
        }
        if !self.saw_event {
            self.pending.push_back(Err(LLMError::StreamClosed {
                message: format!("{} returned an empty event stream", self.provider),
            }));
            return;
        }
        self.pending
            .extend(self.normalizer.finish().into_iter().map(Ok));
    }
}

impl<N: StreamNormalizer> Stream for NormalizedStream<N> {
    type Item = Result<ChatResult, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.decoder).poll_next(cx) {
                Poll::Ready(Some(Ok(SseItem::Event(event)))) => {
                    this.saw_event = true;
                    match this.normalizer.on_event(event) {
                        Ok(results) => this.pending.extend(results.into_iter().map(Ok)),
                        Err(err) => {
                            this.finished = true;
                            this.pending.push_back(Err(err));
                        }
                    }
                }
                Poll::Ready(Some(Ok(SseItem::Done))) | Poll::Ready(None) => this.close(),
                Poll::Ready(Some(Err(err))) if err.is_recoverable() => {
                    tracing::warn!(provider = this.provider, error = %err, "skipping malformed frame");
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Parses an event payload, logging and skipping anything that is not the expected JSON.
pub(crate) fn parse_payload<T: DeserializeOwned>(
    provider: &'static str,
    event: &SseEvent,
) -> Option<T> {
    match event.json() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(provider, error = %err, "skipping unparseable event payload");
            None
        }
    }
}

/// Builds tagged results with the response identity captured so far.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResultFactory {
    pub(crate) provider: &'static str,
    pub(crate) endpoint: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) model: Option<String>,
}

impl ResultFactory {
    pub(crate) fn new(provider: &'static str, endpoint: String) -> Self {
        Self {
            provider,
            endpoint: Some(endpoint),
            ..Self::default()
        }
    }

    fn result(&self, choice: ChatChoice, usage: Option<ChatUsage>, tag: StreamTag) -> ChatResult {
        ChatResult {
            id: self.id.clone(),
            model: self.model.clone(),
            choices: vec![choice],
            usage,
            provider: ProviderMetadata {
                provider: self.provider.to_string(),
                request_id: self.id.clone(),
                endpoint: self.endpoint.clone(),
                raw: None,
            },
            tag,
        }
    }

    pub(crate) fn text_delta(&self, index: usize, text: impl Into<String>) -> ChatResult {
        let delta = ChatMessage::assistant(text);
        self.result(
            ChatChoice {
                index,
                delta: Some(delta),
                ..ChatChoice::default()
            },
            None,
            StreamTag::Delta,
        )
    }

    pub(crate) fn reasoning_delta(&self, index: usize, text: impl Into<String>) -> ChatResult {
        let mut delta = ChatMessage {
            role: ChatRole::Assistant,
            ..ChatMessage::default()
        };
        delta.parts = Some(vec![ChatMessagePart::Reasoning(ChatMessageReasoningData {
            content: Some(text.into()),
            ..ChatMessageReasoningData::default()
        })]);
        self.result(
            ChatChoice {
                index,
                delta: Some(delta),
                ..ChatChoice::default()
            },
            None,
            StreamTag::Delta,
        )
    }

    /// A finished block surfaced for live display only; never appended on its own.
    pub(crate) fn transient_block(&self, index: usize, part: ChatMessagePart) -> ChatResult {
        self.result(
            ChatChoice {
                index,
                message: Some(ChatMessage::from_parts(ChatRole::Assistant, vec![part])),
                ..ChatChoice::default()
            },
            None,
            StreamTag::TransientBlock,
        )
    }

    /// The consolidated assistant message for the conversation.
    pub(crate) fn append_message(
        &self,
        message: ChatMessage,
        finish_reason: Option<FinishReason>,
    ) -> ChatResult {
        self.result(
            ChatChoice {
                index: 0,
                message: Some(message),
                finish_reason,
                ..ChatChoice::default()
            },
            None,
            StreamTag::AppendToConversation,
        )
    }

    pub(crate) fn finish_metadata(
        &self,
        usage: Option<ChatUsage>,
        finish_reason: Option<FinishReason>,
    ) -> ChatResult {
        self.result(
            ChatChoice {
                index: 0,
                finish_reason,
                ..ChatChoice::default()
            },
            usage,
            StreamTag::FinishMetadata,
        )
    }
}

/// Accumulates one streamed tool call until its arguments are complete.
#[derive(Debug, Clone, Default)]
pub(crate) struct ToolCallBuilder {
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) arguments: String,
}

impl ToolCallBuilder {
    /// Merges a fragment; identity fields keep the first non-empty value seen.
    pub(crate) fn absorb(&mut self, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) {
        if self.id.is_none() {
            self.id = id.filter(|v| !v.is_empty()).map(str::to_string);
        }
        if self.name.is_none() {
            self.name = name.filter(|v| !v.is_empty()).map(str::to_string);
        }
        if let Some(fragment) = arguments {
            self.arguments.push_str(fragment);
        }
    }

    pub(crate) fn finish(self, index: usize) -> ToolCall {
        let mut call = ToolCall::function(
            self.id.unwrap_or_default(),
            self.name.unwrap_or_default(),
            self.arguments,
        )
        .with_index(index);
        if call.id.as_deref() == Some("") {
            call.id = None;
        }
        call
    }
}

/// Assembles the final assistant message from text, parts and tool calls.
///
/// `content` is the concatenation of every text part, in part order.
pub(crate) fn assemble_message(
    id: Option<String>,
    parts: Vec<ChatMessagePart>,
    tool_calls: Vec<ToolCall>,
) -> ChatMessage {
    let text: String = parts.iter().filter_map(ChatMessagePart::as_text).collect();
    let mut message = ChatMessage::from_parts(ChatRole::Assistant, parts);
    if !text.is_empty() {
        message.content = Some(text);
    }
    message.id = id;
    message.with_tool_calls(tool_calls)
}

/// Runs a normalizer over an SSE body split into `chunk`-byte pieces.
#[cfg(test)]
pub(crate) async fn run_chunked<N: StreamNormalizer>(
    normalizer: N,
    body: &str,
    chunk: usize,
) -> Vec<Result<ChatResult, LLMError>> {
    use futures_util::{StreamExt, stream};

    let chunks: Vec<Result<Vec<u8>, LLMError>> = body
        .as_bytes()
        .chunks(chunk.max(1))
        .map(|piece| Ok(piece.to_vec()))
        .collect();
    normalized_stream(
        Box::pin(stream::iter(chunks)),
        "test",
        normalizer,
        &CancellationToken::new(),
    )
    .collect()
    .await
}

/// Concatenated text deltas, reasoning deltas, and the appended message.
#[cfg(test)]
pub(crate) fn summarize(results: &[Result<ChatResult, LLMError>]) -> (String, String, ChatMessage) {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut appended = None;
    for result in results.iter().flatten() {
        match result.tag {
            StreamTag::Delta => {
                let Some(delta) = result.choices.first().and_then(|c| c.delta.as_ref()) else {
                    continue;
                };
                if let Some(content) = &delta.content {
                    text.push_str(content);
                }
                for part in delta.reasoning() {
                    reasoning.push_str(part.content.as_deref().unwrap_or_default());
                }
            }
            StreamTag::AppendToConversation => {
                appended = result.choices.first().and_then(|c| c.message.clone());
            }
            _ => {}
        }
    }
    (text, reasoning, appended.unwrap_or_default())
}
