//! Request building: option layering, the vendor serializer table, and surface routing.
//!
//! Every outbound body goes through [`serialize`], which looks up the serializer for a
//! `(vendor, surface)` pair. Vendor rules may rename or silently drop fields the vendor
//! does not accept; they never fail because of an unsupported knob.

use serde_json::Value;

use crate::error::LLMError;
use crate::types::{ChatOptions, ChatRequest, EndpointSurface, Vendor};

mod surface;
mod vendor;

pub use surface::resolve_surface;

/// Serializer signature: request, resolved model, streaming flag.
pub type SerializeFn = fn(&ChatRequest, &str, bool) -> Result<Value, LLMError>;

const SERIALIZERS: &[(Vendor, EndpointSurface, SerializeFn)] = &[
    (Vendor::OpenAi, EndpointSurface::Chat, vendor::openai),
    (
        Vendor::OpenAi,
        EndpointSurface::Responses,
        vendor::openai_responses,
    ),
    (Vendor::Anthropic, EndpointSurface::Chat, vendor::anthropic),
    (Vendor::Google, EndpointSurface::Chat, vendor::gemini),
    (Vendor::Mistral, EndpointSurface::Chat, vendor::mistral),
    (Vendor::XAi, EndpointSurface::Chat, vendor::xai),
    (Vendor::Perplexity, EndpointSurface::Chat, vendor::perplexity),
    (Vendor::DeepSeek, EndpointSurface::Chat, vendor::deepseek),
    (Vendor::Groq, EndpointSurface::Chat, vendor::groq),
    (Vendor::Cohere, EndpointSurface::Chat, vendor::cohere),
    (Vendor::OpenRouter, EndpointSurface::Chat, vendor::openai_compatible),
    (Vendor::Custom, EndpointSurface::Chat, vendor::openai_compatible),
    (
        Vendor::Custom,
        EndpointSurface::Responses,
        vendor::openai_responses,
    ),
];

/// Looks up the serializer registered for a vendor and surface.
pub fn serializer(vendor: Vendor, surface: EndpointSurface) -> Option<SerializeFn> {
    SERIALIZERS
        .iter()
        .find(|(v, s, _)| *v == vendor && *s == surface)
        .map(|(_, _, f)| *f)
}

/// Serializes `request` into the JSON body expected by `vendor` on `surface`.
///
/// # Errors
///
/// Returns [`LLMError::UnsupportedFeature`] when the vendor has no serializer for the
/// surface, or [`LLMError::Validation`] when the request cannot be expressed at all.
pub fn serialize(
    vendor: Vendor,
    surface: EndpointSurface,
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let serialize_fn = serializer(vendor, surface).ok_or(LLMError::UnsupportedFeature {
        feature: match surface {
            EndpointSurface::Chat => "chat surface",
            EndpointSurface::Responses => "responses surface",
        },
    })?;
    serialize_fn(request, model, stream)
}

/// Applies option layering to a request: request values over conversation defaults
/// over library defaults.
pub fn layer_request(
    mut request: ChatRequest,
    conversation: &ChatOptions,
    library: &ChatOptions,
) -> ChatRequest {
    request.options = ChatOptions::layered(&request.options, conversation, library);
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn every_vendor_has_a_chat_serializer() {
        for vendor in [
            Vendor::OpenAi,
            Vendor::Anthropic,
            Vendor::Google,
            Vendor::Cohere,
            Vendor::Mistral,
            Vendor::XAi,
            Vendor::Perplexity,
            Vendor::DeepSeek,
            Vendor::Groq,
            Vendor::OpenRouter,
            Vendor::Custom,
        ] {
            assert!(
                serializer(vendor, EndpointSurface::Chat).is_some(),
                "{vendor:?}"
            );
        }
    }

    #[test]
    fn missing_surface_is_unsupported() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let err = serialize(
            Vendor::Anthropic,
            EndpointSurface::Responses,
            &request,
            "claude-sonnet-4-5",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, LLMError::UnsupportedFeature { .. }));
    }

    #[test]
    fn layer_request_fills_from_defaults() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let conversation = ChatOptions {
            model: Some("gpt-4o".into()),
            ..Default::default()
        };
        let library = ChatOptions {
            max_output_tokens: Some(2048),
            ..Default::default()
        };
        let layered = layer_request(request, &conversation, &library);
        assert_eq!(layered.options.model.as_deref(), Some("gpt-4o"));
        assert_eq!(layered.options.max_output_tokens, Some(2048));
    }
}
