//! Stateful multi-turn exchanges on top of [`LLMClient`].
//!
//! A [`Conversation`] owns an append-only message list. Each exchange sends the list,
//! folds the normalized results into one assistant message, resolves tool calls through
//! the caller's [`ToolCallHandler`], and optionally loops until the model stops asking
//! for tools.

mod aggregate;
mod handlers;
mod tools;

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::{LLMClient, SafeOutcome};
use crate::compression::{
    ChunkedSummarizer, CompressionStrategy, MessageSummarizer, compress_messages,
};
use crate::error::LLMError;
use crate::types::{
    ChatMessage, ChatOptions, ChatRequest, ChatResult, ChatRole, ChatUsage, FinishReason,
    ResponseFormat, ToolCall, ToolChoice, ToolDefinition,
};

use aggregate::{RoundAggregator, RoundOutput};
pub use handlers::{DynToolCallHandler, FnToolHandler, ResponseHandlers, ToolCallHandler};

const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// What one call to an exchange entry point did.
#[derive(Debug, Clone, Default)]
pub struct ExchangeOutcome {
    /// Messages appended to the conversation, in order.
    pub appended: Vec<ChatMessage>,
    /// Tool calls left unresolved because no handler was registered.
    pub pending_tool_calls: Vec<ToolCall>,
    /// The last batch of resolved tool calls.
    pub resolved_tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    /// Usage of the last model round.
    pub usage: Option<ChatUsage>,
    pub cancelled: bool,
    pub rounds: usize,
}

impl ExchangeOutcome {
    /// Text of the last assistant message appended.
    pub fn text(&self) -> Option<String> {
        self.appended
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::Assistant)
            .and_then(ChatMessage::text)
    }
}

#[derive(Clone)]
struct Compression {
    strategy: Arc<dyn CompressionStrategy>,
    summarizer: Arc<dyn MessageSummarizer>,
}

/// An ordered message history bound to one model handle.
///
/// Concurrent exchanges on the same conversation are not supported; every entry point
/// takes `&mut self`.
pub struct Conversation {
    client: LLMClient,
    handle: String,
    messages: Vec<ChatMessage>,
    defaults: ChatOptions,
    tools: Vec<ToolDefinition>,
    tool_choice: Option<ToolChoice>,
    response_format: Option<ResponseFormat>,
    trim_response_start: bool,
    max_tool_rounds: usize,
    current_response: Option<ChatResult>,
    compression: Option<Compression>,
}

impl Conversation {
    pub(crate) fn new(client: LLMClient, handle: String) -> Self {
        Self {
            client,
            handle,
            messages: Vec::new(),
            defaults: ChatOptions::default(),
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            trim_response_start: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            current_response: None,
            compression: None,
        }
    }

    /// Conversation-level defaults, layered between request and library options.
    pub fn with_defaults(mut self, defaults: ChatOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_trim_response_start(mut self, trim: bool) -> Self {
        self.trim_response_start = trim;
        self
    }

    /// Upper bound on model rounds per exchange when tool results are fed back.
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_compression(
        mut self,
        strategy: Arc<dyn CompressionStrategy>,
        summarizer: Arc<dyn MessageSummarizer>,
    ) -> Self {
        self.compression = Some(Compression {
            strategy,
            summarizer,
        });
        self
    }

    /// Registers `strategy` with a [`ChunkedSummarizer`] on this conversation's handle.
    pub fn with_chunked_compression(self, strategy: Arc<dyn CompressionStrategy>) -> Self {
        let summarizer = Arc::new(ChunkedSummarizer::new(
            self.client.clone(),
            self.handle.clone(),
        ));
        self.with_compression(strategy, summarizer)
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn defaults(&self) -> &ChatOptions {
        &self.defaults
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Result of the most recent model round.
    pub fn current_response(&self) -> Option<&ChatResult> {
        self.current_response.as_ref()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.current_response = None;
    }

    pub fn append_message(&mut self, mut message: ChatMessage) {
        if message.id.is_none() {
            message.id = Some(Uuid::new_v4().to_string());
        }
        self.messages.push(message);
    }

    pub fn append_user_input(&mut self, text: impl Into<String>) {
        self.append_message(ChatMessage::user(text));
    }

    pub fn append_system_message(&mut self, text: impl Into<String>) {
        self.append_message(ChatMessage::system(text));
    }

    pub fn append_assistant_message(&mut self, text: impl Into<String>) {
        self.append_message(ChatMessage::assistant(text));
    }

    /// Sends the conversation and returns the assistant's text.
    pub async fn get_response(&mut self) -> Result<Option<String>, LLMError> {
        self.get_response_rich(ResponseHandlers::default())
            .await
            .map(|outcome| outcome.text())
    }

    pub async fn get_response_safe(&mut self) -> SafeOutcome<Option<String>> {
        self.get_response().await.into()
    }

    /// Buffered exchange with tool resolution and continuation.
    pub async fn get_response_rich(
        &mut self,
        handlers: ResponseHandlers,
    ) -> Result<ExchangeOutcome, LLMError> {
        self.exchange(handlers, false, &CancellationToken::new())
            .await
    }

    pub async fn get_response_rich_safe(
        &mut self,
        handlers: ResponseHandlers,
    ) -> SafeOutcome<ExchangeOutcome> {
        self.get_response_rich(handlers).await.into()
    }

    /// Streaming exchange: tokens reach `handlers` as they arrive.
    ///
    /// When `cancel` fires, the exchange stops without appending anything from the
    /// interrupted round and returns an outcome with `cancelled` set, or
    /// [`LLMError::Aborted`] if the handlers opted into error surfacing.
    pub async fn stream_response_rich(
        &mut self,
        handlers: ResponseHandlers,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, LLMError> {
        self.exchange(handlers, true, cancel).await
    }

    pub async fn stream_response_rich_safe(
        &mut self,
        handlers: ResponseHandlers,
        cancel: &CancellationToken,
    ) -> SafeOutcome<ExchangeOutcome> {
        self.stream_response_rich(handlers, cancel).await.into()
    }

    /// Replaces older history with summaries using the registered strategy.
    ///
    /// Returns false when no strategy is registered or nothing was old enough to compress.
    pub async fn compress(&mut self, cancel: &CancellationToken) -> Result<bool, LLMError> {
        let Some(compression) = self.compression.clone() else {
            return Ok(false);
        };
        let options = compression.strategy.options(self);
        let Some(compressed) = compress_messages(
            &self.messages,
            &options,
            compression.summarizer.as_ref(),
            cancel,
        )
        .await?
        else {
            return Ok(false);
        };

        tracing::debug!(
            before = self.messages.len(),
            after = compressed.len(),
            "compressed conversation history"
        );
        self.messages.clear();
        for message in compressed {
            self.append_message(message);
        }
        Ok(true)
    }

    async fn compress_if_needed(&mut self, cancel: &CancellationToken) -> Result<(), LLMError> {
        let due = self
            .compression
            .as_ref()
            .is_some_and(|compression| compression.strategy.should_compress(self));
        if due {
            self.compress(cancel).await?;
        }
        Ok(())
    }

    fn request(&self) -> ChatRequest {
        ChatRequest {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
            response_format: self.response_format.clone(),
            ..ChatRequest::default()
        }
    }

    async fn exchange(
        &mut self,
        mut handlers: ResponseHandlers,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, LLMError> {
        let mut outcome = ExchangeOutcome::default();
        loop {
            if cancel.is_cancelled() {
                return cancelled(outcome, &handlers);
            }
            let round = match self.round(&mut handlers, streaming, cancel).await {
                Ok(round) => round,
                Err(_) if cancel.is_cancelled() => return cancelled(outcome, &handlers),
                Err(err) => return Err(err),
            };
            outcome.rounds += 1;

            let RoundOutput {
                mut message,
                finish_reason,
                usage,
                response,
            } = round;
            if let Some(usage) = &usage {
                // later rounds also count tool results and replayed calls
                let first_round = outcome.rounds == 1;
                if let Some(user) = self
                    .messages
                    .iter_mut()
                    .rev()
                    .find(|message| message.role == ChatRole::User)
                    .filter(|_| first_round)
                {
                    user.tokens = Some(usage.prompt_tokens);
                }
                message.tokens = Some(usage.completion_tokens);
                handlers.usage(usage);
            }
            handlers.finished(finish_reason.as_ref());
            self.current_response = Some(response);
            outcome.finish_reason = finish_reason;
            outcome.usage = usage;

            if !message.has_tool_calls() {
                self.push(message, &mut outcome);
                break;
            }
            let Some(tool_handler) = handlers.tool_handler.clone() else {
                outcome.pending_tool_calls = message.tool_calls.clone().unwrap_or_default();
                self.push(message, &mut outcome);
                break;
            };

            let mut calls = message.tool_calls.take().unwrap_or_default();
            if tools::resolve_calls(tool_handler.as_ref(), &mut calls, cancel)
                .await
                .is_err()
            {
                return cancelled(outcome, &handlers);
            }
            let tool_messages = tools::tool_messages(&calls);
            message.tool_calls = Some(calls.clone());
            self.push(message, &mut outcome);
            for tool_message in tool_messages {
                self.push(tool_message, &mut outcome);
            }
            outcome.resolved_tool_calls = calls;

            if !handlers.tool_results(&outcome.resolved_tool_calls) {
                break;
            }
            if outcome.rounds >= self.max_tool_rounds {
                tracing::warn!(
                    rounds = outcome.rounds,
                    "tool round limit reached, returning to caller"
                );
                break;
            }
        }
        Ok(outcome)
    }

    async fn round(
        &mut self,
        handlers: &mut ResponseHandlers,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<RoundOutput, LLMError> {
        self.compress_if_needed(cancel).await?;
        let request = self.request();

        if !streaming {
            let result = self
                .client
                .chat_with(&self.handle, request, &self.defaults, cancel)
                .await?;
            return RoundAggregator::buffered(result, self.trim_response_start, handlers);
        }

        let mut stream = self
            .client
            .stream_with(&self.handle, request, &self.defaults, cancel)
            .await?;
        let mut aggregator = RoundAggregator::new(self.trim_response_start);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LLMError::aborted()),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(result)) => aggregator.absorb(result, handlers),
                Some(Err(err)) if err.is_recoverable() => {
                    tracing::warn!(error = %err, "skipping undecodable stream item");
                }
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        aggregator.finish(handlers)
    }

    fn push(&mut self, message: ChatMessage, outcome: &mut ExchangeOutcome) {
        self.append_message(message);
        if let Some(appended) = self.messages.last() {
            outcome.appended.push(appended.clone());
        }
    }
}

fn cancelled(
    mut outcome: ExchangeOutcome,
    handlers: &ResponseHandlers,
) -> Result<ExchangeOutcome, LLMError> {
    tracing::debug!(rounds = outcome.rounds, "exchange cancelled");
    if handlers.surface_errors {
        return Err(LLMError::aborted());
    }
    outcome.cancelled = true;
    Ok(outcome)
}
