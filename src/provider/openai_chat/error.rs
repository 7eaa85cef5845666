use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, classify_status};

use super::PROVIDER;

/// Parses an OpenAI-style error body. Most compatible vendors reuse this shape; a few
/// send `{"message": ...}` or `{"detail": ...}` at the top level instead.
pub(crate) fn parse_openai_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<InnerError>,
        message: Option<String>,
        detail: Option<Value>,
    }

    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<Value>,
    }

    let Ok(envelope) = serde_json::from_str::<Envelope>(body) else {
        return LLMError::Provider {
            provider: PROVIDER,
            message: format!("status {status}: {body}"),
        };
    };

    let (message, code) = match envelope.error {
        Some(error) => {
            let code = match error.code {
                Some(Value::String(code)) => Some(code),
                Some(Value::Number(code)) => Some(code.to_string()),
                _ => error.kind,
            };
            let message = error.message.unwrap_or_else(|| "unknown error".to_string());
            (message, code)
        }
        None => {
            let message = envelope
                .message
                .or_else(|| envelope.detail.map(|detail| detail.to_string()))
                .unwrap_or_else(|| format!("status {status}: {body}"));
            (message, None)
        }
    };
    let message = match &code {
        Some(code) => format!("{message} ({code})"),
        None => message,
    };
    classify_status(PROVIDER, status, message, code.as_deref(), retry_after)
}
