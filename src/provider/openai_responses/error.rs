use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, classify_status};

use super::PROVIDER;

/// Parses error responses returned by the OpenAI Responses API.
pub(crate) fn parse_openai_responses_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }
    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        code: Option<Value>,
    }

    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        return LLMError::Provider {
            provider: PROVIDER,
            message: format!("status {status}: {body}"),
        };
    };

    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    let code = match error.code {
        Some(Value::String(code)) => Some(code),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    if let Some(code) = &code {
        message = format!("{message} ({code})");
    }
    classify_status(PROVIDER, status, message, code.as_deref(), retry_after)
}
