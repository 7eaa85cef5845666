use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::types::{ChatMessage, FunctionResult, ToolCall};

use super::handlers::ToolCallHandler;

/// Content of a tool message whose call produced nothing.
pub(crate) const NO_DATA: &str = "no data returned";

/// Resolves one batch of calls.
///
/// Calls with unparseable arguments are failed up front and the handler sees the whole
/// batch. A handler error fails every call it left unresolved. Only cancellation makes
/// this return `Err`.
pub(crate) async fn resolve_calls(
    handler: &dyn ToolCallHandler,
    calls: &mut [ToolCall],
    cancel: &CancellationToken,
) -> Result<(), LLMError> {
    for call in calls.iter_mut() {
        if let Err(err) = call.arguments_map() {
            tracing::debug!(tool = call.name(), error = %err, "tool arguments did not parse");
            call.set_result(FunctionResult::failure(format!(
                "invalid arguments for {}: {err}",
                call.name()
            )));
        }
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(LLMError::aborted()),
        outcome = handler.resolve(calls) => outcome,
    };

    if let Err(err) = outcome {
        tracing::warn!(error = %err, calls = calls.len(), "tool handler failed");
        for call in calls.iter_mut().filter(|call| call.result().is_none()) {
            call.set_result(FunctionResult::failure(err.to_string()));
        }
    }
    Ok(())
}

/// One tool-role message per call, in call order.
pub(crate) fn tool_messages(calls: &[ToolCall]) -> Vec<ChatMessage> {
    calls
        .iter()
        .map(|call| {
            let (content, succeeded) = match call.result() {
                Some(result) if !result.content.is_empty() => {
                    (result.content.clone(), result.invocation_succeeded)
                }
                Some(result) => (NO_DATA.to_string(), result.invocation_succeeded),
                None => (NO_DATA.to_string(), false),
            };
            ChatMessage::tool_result(call.id.clone().unwrap_or_default(), content, succeeded)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::conversation::FnToolHandler;
    use crate::types::ChatRole;

    struct Failing;

    #[async_trait]
    impl ToolCallHandler for Failing {
        async fn resolve(&self, calls: &mut [ToolCall]) -> Result<(), LLMError> {
            calls[0].set_result(FunctionResult::success("first"));
            Err(LLMError::transport("weather backend unreachable"))
        }
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_the_handler() {
        let mut calls = vec![
            ToolCall::function("call_1", "weather", "{\"city\":"),
            ToolCall::function("call_2", "clock", ""),
        ];
        let handler = FnToolHandler::new(|call| Some(FunctionResult::success(call.name())));
        resolve_calls(&handler, &mut calls, &CancellationToken::new())
            .await
            .unwrap();

        let first = calls[0].result().unwrap();
        assert!(!first.invocation_succeeded);
        assert!(first.content.contains("invalid arguments"));
        assert_eq!(calls[1].result().unwrap().content, "clock");
    }

    #[tokio::test]
    async fn handler_error_fails_the_rest_of_the_batch() {
        let mut calls = vec![
            ToolCall::function("call_1", "weather", "{}"),
            ToolCall::function("call_2", "weather", "{}"),
        ];
        resolve_calls(&Failing, &mut calls, &CancellationToken::new())
            .await
            .unwrap();
        assert!(calls[0].result().unwrap().invocation_succeeded);
        let second = calls[1].result().unwrap();
        assert!(!second.invocation_succeeded);
        assert!(second.content.contains("weather backend unreachable"));
    }

    #[tokio::test]
    async fn cancellation_stops_resolution() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = vec![ToolCall::function("call_1", "weather", "{}")];
        let handler = FnToolHandler::new(|_| Some(FunctionResult::success("sunny")));
        let err = resolve_calls(&handler, &mut calls, &cancel).await.unwrap_err();
        assert!(matches!(err, LLMError::Aborted { .. }));
    }

    #[test]
    fn unresolved_calls_use_the_sentinel() {
        let mut resolved = ToolCall::function("call_1", "weather", "{}");
        resolved.set_result(FunctionResult::success("sunny"));
        let messages = tool_messages(&[resolved, ToolCall::function("call_2", "clock", "{}")]);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::Tool);
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[0].content.as_deref(), Some("sunny"));
        assert_eq!(messages[0].tool_invocation_succeeded, Some(true));
        assert_eq!(messages[1].content.as_deref(), Some(NO_DATA));
        assert_eq!(messages[1].tool_invocation_succeeded, Some(false));
    }
}
