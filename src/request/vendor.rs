//! Per-vendor serializers. The OpenAI-compatible family shares one base body and then
//! applies small rewrite and strip rules.

use serde_json::{Value, json};

use crate::catalog::is_reasoning_model;
use crate::error::LLMError;
use crate::provider::anthropic_messages::request::build_anthropic_body;
use crate::provider::google_gemini::request::build_gemini_body;
use crate::provider::openai_chat::request::build_openai_body;
use crate::provider::openai_responses::request::build_openai_responses_body;
use crate::types::{ChatRequest, Vendor};

const SAMPLING: &[&str] = &[
    "temperature",
    "top_p",
    "presence_penalty",
    "frequency_penalty",
    "logit_bias",
    "logprobs",
    "top_logprobs",
];

/// Removes fields the vendor rejects. Dropping is silent apart from a debug log.
fn strip(body: &mut Value, vendor: Vendor, fields: &[&str]) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    for field in fields {
        if obj.remove(*field).is_some() {
            tracing::debug!(
                vendor = vendor.as_str(),
                field,
                "dropping field unsupported by vendor"
            );
        }
    }
}

fn rename(body: &mut Value, from: &str, to: &str) {
    if let Some(obj) = body.as_object_mut() {
        if let Some(value) = obj.remove(from) {
            obj.insert(to.to_string(), value);
        }
    }
}

pub(super) fn openai_compatible(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    build_openai_body(request, model, stream)
}

pub(super) fn openai(request: &ChatRequest, model: &str, stream: bool) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    if is_reasoning_model(model) {
        rename(&mut body, "max_tokens", "max_completion_tokens");
        strip(&mut body, Vendor::OpenAi, SAMPLING);
    }
    Ok(body)
}

pub(super) fn openai_responses(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = build_openai_responses_body(request, model, stream)?;
    if is_reasoning_model(model) {
        strip(&mut body, Vendor::OpenAi, &["temperature", "top_p"]);
    }
    Ok(body)
}

pub(super) fn anthropic(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    build_anthropic_body(request, model, stream)
}

pub(super) fn gemini(request: &ChatRequest, model: &str, stream: bool) -> Result<Value, LLMError> {
    build_gemini_body(request, model, stream)
}

pub(super) fn mistral(request: &ChatRequest, model: &str, stream: bool) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    if body.get("tool_choice") == Some(&json!("required")) {
        body["tool_choice"] = json!("any");
    }
    rename(&mut body, "seed", "random_seed");
    strip(
        &mut body,
        Vendor::Mistral,
        &["stream_options", "metadata", "logit_bias"],
    );
    Ok(body)
}

pub(super) fn xai(request: &ChatRequest, model: &str, stream: bool) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    strip(&mut body, Vendor::XAi, &["metadata"]);
    if is_reasoning_model(model) {
        strip(
            &mut body,
            Vendor::XAi,
            &["presence_penalty", "frequency_penalty", "stop"],
        );
        // only the grok-3-mini family takes an explicit effort
        if !model.starts_with("grok-3-mini") {
            strip(&mut body, Vendor::XAi, &["reasoning_effort"]);
        }
    }
    Ok(body)
}

pub(super) fn perplexity(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    strip(
        &mut body,
        Vendor::Perplexity,
        &[
            "tools",
            "tool_choice",
            "parallel_tool_calls",
            "n",
            "stream_options",
            "metadata",
            "seed",
        ],
    );
    Ok(body)
}

pub(super) fn deepseek(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    strip(&mut body, Vendor::DeepSeek, &["metadata", "reasoning_effort"]);
    if is_reasoning_model(model) {
        strip(&mut body, Vendor::DeepSeek, SAMPLING);
    }
    Ok(body)
}

pub(super) fn groq(request: &ChatRequest, model: &str, stream: bool) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    strip(
        &mut body,
        Vendor::Groq,
        &["logit_bias", "logprobs", "top_logprobs", "metadata"],
    );
    Ok(body)
}

pub(super) fn cohere(request: &ChatRequest, model: &str, stream: bool) -> Result<Value, LLMError> {
    let mut body = build_openai_body(request, model, stream)?;
    strip(
        &mut body,
        Vendor::Cohere,
        &["parallel_tool_calls", "logit_bias", "metadata"],
    );
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::{ChatMessage, ChatOptions, ToolChoice, ToolDefinition};

    fn request(options: ChatOptions) -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user("hello")]).with_options(options)
    }

    #[test]
    fn openai_reasoning_models_use_max_completion_tokens() {
        let req = request(ChatOptions {
            max_output_tokens: Some(300),
            temperature: Some(0.2),
            ..Default::default()
        });

        let reasoning = openai(&req, "o3-mini", false).unwrap();
        assert_eq!(reasoning["max_completion_tokens"], json!(300));
        assert!(reasoning.get("max_tokens").is_none());
        assert!(reasoning.get("temperature").is_none());

        let classic = openai(&req, "gpt-4o", false).unwrap();
        assert_eq!(classic["max_tokens"], json!(300));
        assert!(classic.get("max_completion_tokens").is_none());
        assert!(classic.get("temperature").is_some());
    }

    #[test]
    fn mistral_rewrites_tool_choice_and_seed() {
        let mut req = request(ChatOptions {
            seed: Some(7),
            ..Default::default()
        });
        req.tools = vec![ToolDefinition::function(
            "f",
            "does f",
            json!({"type": "object"}),
        )];
        req.tool_choice = Some(ToolChoice::Any);

        let body = mistral(&req, "mistral-large-latest", true).unwrap();
        assert_eq!(body["tool_choice"], json!("any"));
        assert_eq!(body["random_seed"], json!(7));
        assert!(body.get("seed").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn perplexity_strips_tools_silently() {
        let mut req = request(ChatOptions::default());
        req.tools = vec![ToolDefinition::function("f", "f", json!({}))];
        req.tool_choice = Some(ToolChoice::Auto);

        let body = perplexity(&req, "sonar-pro", true).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["stream"], json!(true));
    }

    #[test]
    fn deepseek_reasoner_drops_sampling_but_keeps_extra() {
        let req = request(ChatOptions {
            temperature: Some(0.7),
            extra: HashMap::from([("user".to_string(), json!("u1"))]),
            ..Default::default()
        });
        let body = deepseek(&req, "deepseek-reasoner", false).unwrap();
        assert!(body.get("temperature").is_none());
        assert_eq!(body["user"], json!("u1"));

        let chat = deepseek(&req, "deepseek-chat", false).unwrap();
        assert!(chat.get("temperature").is_some());
    }

    #[test]
    fn xai_reasoning_models_drop_penalties() {
        let req = request(ChatOptions {
            presence_penalty: Some(0.5),
            stop: Some(vec!["END".into()]),
            ..Default::default()
        });
        let body = xai(&req, "grok-4", false).unwrap();
        assert!(body.get("presence_penalty").is_none());
        assert!(body.get("stop").is_none());

        let body = xai(&req, "grok-2", false).unwrap();
        assert_eq!(body["stop"], json!(["END"]));
    }
}
