use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, classify_status};

use super::PROVIDER;

/// Parses a Google RPC error body (`{"error": {"code", "message", "status"}}`).
pub(crate) fn parse_gemini_error(
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
        status: Option<String>,
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
    let code = error.status.filter(|s| !s.is_empty());
    if let Some(code) = &code {
        message = format!("{message} ({code})");
    }
    let code = code.map(|code| match code.as_str() {
        "NOT_FOUND" => "not_found".to_string(),
        _ => code,
    });
    classify_status(PROVIDER, status, message, code.as_deref(), retry_after)
}
