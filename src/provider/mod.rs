use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::{
    HttpBodyStream, HttpTransport, post_json_stream_with_headers, post_json_with_headers,
};
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult, EndpointSurface, Vendor};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod normalize;
pub mod openai_chat;
pub mod openai_responses;
pub(crate) mod retry;

use retry::retry_after_from_headers;

/// Ordered stream of normalized results for one request.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatResult, LLMError>> + Send>>;

/// A vendor API surface the client can send requests to.
///
/// `chat` returns the fully buffered result. `stream_chat` returns the normalized
/// delta stream; it ends with one consolidated message followed by finish metadata.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError>;

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatStream, LLMError>;

    fn capabilities(&self) -> CapabilityDescriptor;

    /// Stable identifier such as `anthropic_messages`.
    fn name(&self) -> &'static str;

    fn vendor(&self) -> Vendor;

    fn surface(&self) -> EndpointSurface {
        EndpointSurface::Chat
    }

    /// Model used when a request does not name one.
    fn default_model(&self) -> Option<&str> {
        None
    }
}

pub type DynProvider = Arc<dyn LLMProvider>;

/// Buffers an error response body so it can be parsed for diagnostics.
pub(crate) async fn collect_stream_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> Result<String, LLMError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes).map_err(|err| LLMError::Provider {
        provider,
        message: format!("failed to decode stream error body: {err}"),
    })
}

/// Resolves the model for a request: explicit option first, provider default second.
pub(crate) fn resolve_model(
    request: &ChatRequest,
    default_model: Option<&String>,
    provider: &'static str,
) -> Result<String, LLMError> {
    request
        .options
        .model
        .clone()
        .or_else(|| default_model.cloned())
        .ok_or_else(|| LLMError::Validation {
            message: format!("model is required for {provider}"),
        })
}

/// Vendor error-body parser: status, body text, parsed `Retry-After`.
pub(crate) type ErrorParser = fn(u16, &str, Option<Duration>) -> LLMError;

/// Posts a JSON body and decodes a successful response as `T`.
pub(crate) async fn post_for_json<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    url: String,
    headers: HashMap<String, String>,
    body: &Value,
    cancel: &CancellationToken,
    provider: &'static str,
    parse_error: ErrorParser,
) -> Result<(T, Value), LLMError> {
    let response = post_json_with_headers(transport, url, headers, body, cancel).await?;
    let (status, success) = (response.status, response.is_success());
    let retry_after = retry_after_from_headers(&response.headers);
    let text = response.into_string()?;
    if !success {
        return Err(parse_error(status, &text, retry_after));
    }
    let raw: Value = serde_json::from_str(&text).map_err(|err| LLMError::Provider {
        provider,
        message: format!("failed to parse response: {err}"),
    })?;
    let parsed = serde_json::from_value(raw.clone()).map_err(|err| LLMError::Provider {
        provider,
        message: format!("unexpected response shape: {err}"),
    })?;
    Ok((parsed, raw))
}

/// Opens an event stream, turning a non-2xx status into the vendor's error.
pub(crate) async fn post_for_stream(
    transport: &dyn HttpTransport,
    url: String,
    headers: HashMap<String, String>,
    body: &Value,
    cancel: &CancellationToken,
    provider: &'static str,
    parse_error: ErrorParser,
) -> Result<HttpBodyStream, LLMError> {
    let response = post_json_stream_with_headers(transport, url, headers, body, cancel).await?;
    if !(200..300).contains(&response.status) {
        let retry_after = retry_after_from_headers(&response.headers);
        let text = collect_stream_text(response.body, provider).await?;
        return Err(parse_error(response.status, &text, retry_after));
    }
    Ok(response.body)
}
