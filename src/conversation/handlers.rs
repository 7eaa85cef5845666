use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LLMError;
use crate::types::{ChatMessageReasoningData, ChatUsage, FinishReason, FunctionResult, ToolCall};

/// Resolves a batch of tool calls requested in one model turn.
///
/// Implementations populate each call's result with [`ToolCall::set_result`]. Calls left
/// without a result are reported back to the model as failed.
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    async fn resolve(&self, calls: &mut [ToolCall]) -> Result<(), LLMError>;
}

pub type DynToolCallHandler = Arc<dyn ToolCallHandler>;

/// Adapts a synchronous per-call function into a [`ToolCallHandler`].
///
/// Returning `None` leaves the call unresolved.
///
/// # Examples
///
/// ```
/// # use polyvox_llm::conversation::FnToolHandler;
/// # use polyvox_llm::types::FunctionResult;
/// let handler = FnToolHandler::new(|call| match call.name() {
///     "clock" => Some(FunctionResult::success("12:00")),
///     _ => None,
/// });
/// # let _ = handler;
/// ```
pub struct FnToolHandler<F> {
    resolve: F,
}

impl<F> FnToolHandler<F>
where
    F: Fn(&ToolCall) -> Option<FunctionResult> + Send + Sync,
{
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }
}

#[async_trait]
impl<F> ToolCallHandler for FnToolHandler<F>
where
    F: Fn(&ToolCall) -> Option<FunctionResult> + Send + Sync,
{
    async fn resolve(&self, calls: &mut [ToolCall]) -> Result<(), LLMError> {
        for call in calls.iter_mut().filter(|call| call.result().is_none()) {
            if let Some(result) = (self.resolve)(call) {
                call.set_result(result);
            }
        }
        Ok(())
    }
}

type TextCallback = Box<dyn FnMut(&str) + Send>;
type ReasoningCallback = Box<dyn FnMut(&ChatMessageReasoningData) + Send>;
type ToolResultsCallback = Box<dyn FnMut(&[ToolCall]) -> bool + Send>;
type UsageCallback = Box<dyn FnMut(&ChatUsage) + Send>;
type FinishedCallback = Box<dyn FnMut(Option<&FinishReason>) + Send>;

/// Extension points for one exchange.
///
/// Every hook is optional. Without a tool handler, tool calls stay unresolved in the
/// conversation and are reported as pending. Without `on_tool_results` the exchange
/// stops after one round of tool resolution.
#[derive(Default)]
pub struct ResponseHandlers {
    on_token: Option<TextCallback>,
    on_reasoning_token: Option<TextCallback>,
    on_reasoning: Option<ReasoningCallback>,
    pub(crate) tool_handler: Option<DynToolCallHandler>,
    on_tool_results: Option<ToolResultsCallback>,
    on_usage: Option<UsageCallback>,
    on_finished: Option<FinishedCallback>,
    pub(crate) surface_errors: bool,
}

impl ResponseHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every text increment, in arrival order.
    pub fn on_token(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_token = Some(Box::new(callback));
        self
    }

    /// Called for every reasoning increment while streaming.
    pub fn on_reasoning_token(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_reasoning_token = Some(Box::new(callback));
        self
    }

    /// Called once per finished reasoning block.
    pub fn on_reasoning(
        mut self,
        callback: impl FnMut(&ChatMessageReasoningData) + Send + 'static,
    ) -> Self {
        self.on_reasoning = Some(Box::new(callback));
        self
    }

    pub fn tool_handler(mut self, handler: DynToolCallHandler) -> Self {
        self.tool_handler = Some(handler);
        self
    }

    /// Continuation policy: returning true sends the tool results back to the model.
    pub fn on_tool_results(
        mut self,
        callback: impl FnMut(&[ToolCall]) -> bool + Send + 'static,
    ) -> Self {
        self.on_tool_results = Some(Box::new(callback));
        self
    }

    /// Always continue after tool resolution, up to the conversation's round limit.
    pub fn auto_continue(self) -> Self {
        self.on_tool_results(|_| true)
    }

    pub fn on_usage(mut self, callback: impl FnMut(&ChatUsage) + Send + 'static) -> Self {
        self.on_usage = Some(Box::new(callback));
        self
    }

    pub fn on_finished(
        mut self,
        callback: impl FnMut(Option<&FinishReason>) + Send + 'static,
    ) -> Self {
        self.on_finished = Some(Box::new(callback));
        self
    }

    /// Report cancellation as [`LLMError::Aborted`] instead of a cancelled outcome.
    pub fn surface_errors(mut self, surface: bool) -> Self {
        self.surface_errors = surface;
        self
    }

    pub(crate) fn token(&mut self, text: &str) {
        if let Some(callback) = self.on_token.as_mut() {
            callback(text);
        }
    }

    pub(crate) fn reasoning_token(&mut self, text: &str) {
        if let Some(callback) = self.on_reasoning_token.as_mut() {
            callback(text);
        }
    }

    pub(crate) fn reasoning(&mut self, data: &ChatMessageReasoningData) {
        if let Some(callback) = self.on_reasoning.as_mut() {
            callback(data);
        }
    }

    pub(crate) fn tool_results(&mut self, calls: &[ToolCall]) -> bool {
        self.on_tool_results
            .as_mut()
            .is_some_and(|callback| callback(calls))
    }

    pub(crate) fn usage(&mut self, usage: &ChatUsage) {
        if let Some(callback) = self.on_usage.as_mut() {
            callback(usage);
        }
    }

    pub(crate) fn finished(&mut self, reason: Option<&FinishReason>) {
        if let Some(callback) = self.on_finished.as_mut() {
            callback(reason);
        }
    }
}
