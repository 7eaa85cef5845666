use std::env;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use dotenvy::dotenv;
use futures_util::StreamExt;
use polyvox_llm::http::reqwest::default_dyn_transport;
use polyvox_llm::provider::openai_chat::OpenAiChatProvider;
use polyvox_llm::types::{
    ChatMessage, ChatMessagePart, ChatOptions, ChatRequest, ChatRole, FinishReason, ImagePart,
    MediaSource, TextPart, ToolChoice, ToolDefinition,
};
use polyvox_llm::{LLMClient, LLMProvider, ResponseHandlers};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// 1x1 red PNG.
const RED_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8,
    0xCF, 0xC0, 0x00, 0x00, 0x03, 0x01, 0x01, 0x00, 0x18, 0xDD, 0x8D, 0xB0, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_basic_text_dialog_live() {
    dotenv().ok();
    let Some((provider, _)) = build_provider_from_env() else {
        return;
    };

    let request = ChatRequest::new(vec![
        ChatMessage::system("You are a helpful assistant. Always answer in English."),
        ChatMessage::user("Reply with exactly the word: pong"),
    ]);
    let response = provider
        .chat(request, &CancellationToken::new())
        .await
        .expect("text dialog should succeed");

    let text = response.text().expect("assistant should return text");
    assert!(
        text.to_lowercase().contains("pong"),
        "answer should contain pong, got: {text}"
    );
    assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_basic_image_understanding_dialog_live() {
    dotenv().ok();
    let Some((provider, _)) = build_provider_from_env() else {
        return;
    };

    let image = general_purpose::STANDARD.encode(RED_PIXEL);
    let request = ChatRequest::new(vec![ChatMessage::from_parts(
        ChatRole::User,
        vec![
            ChatMessagePart::Text(TextPart::new(
                "What color is this image? Answer with one word.",
            )),
            ChatMessagePart::Image(ImagePart {
                source: MediaSource::Base64 {
                    data: image,
                    mime_type: Some("image/png".to_string()),
                },
                detail: None,
            }),
        ],
    )])
    .with_options(ChatOptions {
        max_output_tokens: Some(50),
        ..ChatOptions::default()
    });

    let response = provider
        .chat(request, &CancellationToken::new())
        .await
        .expect("image request should succeed");
    let text = response.text().expect("assistant should describe the image");
    assert!(
        text.to_lowercase().contains("red"),
        "answer should name the color, got: {text}"
    );
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_basic_tool_call_dialog_live() {
    dotenv().ok();
    let Some((provider, _)) = build_provider_from_env() else {
        return;
    };

    let mut request = ChatRequest::new(vec![ChatMessage::user(
        "What's the weather in Boston today? Call get_current_weather with Boston, MA.",
    )])
    .with_tools(vec![weather_tool()]);
    request.tool_choice = Some(ToolChoice::Tool {
        name: "get_current_weather".to_string(),
    });

    let response = provider
        .chat(request, &CancellationToken::new())
        .await
        .expect("tool call request should succeed");
    let message = response.first_message().expect("assistant message");
    let call = message
        .tool_calls
        .as_ref()
        .and_then(|calls| calls.first())
        .expect("model must call the tool");
    let arguments = call.arguments_map().expect("arguments should be a JSON object");
    let location = arguments
        .get("location")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    assert!(
        location.contains("Boston"),
        "tool arguments should contain Boston, got: {location}"
    );
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_live_sync_and_stream() {
    dotenv().ok();
    let Some((provider, _)) = build_provider_from_env() else {
        return;
    };

    let request = ChatRequest::new(vec![
        ChatMessage::system("You are a helpful assistant."),
        ChatMessage::user("Please introduce the Rust language in one sentence."),
    ]);
    let response = provider
        .chat(request.clone(), &CancellationToken::new())
        .await
        .expect("chat request should succeed");
    assert!(response.text().is_some(), "chat response should contain text");

    let mut stream = provider
        .stream_chat(request, &CancellationToken::new())
        .await
        .expect("streaming chat should start");
    let mut streamed = String::new();
    let mut saw_usage = false;
    while let Some(item) = stream.next().await {
        let item = item.expect("stream item should be valid");
        if let Some(delta) = item.choices.first().and_then(|c| c.delta.as_ref()) {
            streamed.push_str(delta.content.as_deref().unwrap_or_default());
        }
        saw_usage |= item.usage.is_some();
    }
    assert!(!streamed.is_empty(), "stream should yield text deltas");
    assert!(saw_usage, "stream should report usage");
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_conversation_tool_loop_live() {
    dotenv().ok();
    let Some((provider, _)) = build_provider_from_env() else {
        return;
    };
    let client = LLMClient::builder()
        .register_handle("live", Arc::new(provider))
        .build();

    let mut conversation = client
        .conversation("live")
        .with_tools(vec![weather_tool()]);
    conversation.append_user_input("Use the tool to check the weather in Boston, MA, then summarize it.");

    let handler = polyvox_llm::conversation::FnToolHandler::new(|_| {
        Some(polyvox_llm::types::FunctionResult::success(
            json!({"temperature": 21, "unit": "celsius", "sky": "clear"}).to_string(),
        ))
    });
    let outcome = conversation
        .stream_response_rich(
            ResponseHandlers::new()
                .tool_handler(Arc::new(handler))
                .auto_continue(),
            &CancellationToken::new(),
        )
        .await
        .expect("conversation should complete");

    assert!(outcome.rounds >= 2, "tool results should be sent back");
    let text = outcome.text().expect("final answer");
    assert!(text.contains("21"), "answer should use the tool result, got: {text}");
}

fn weather_tool() -> ToolDefinition {
    ToolDefinition::function(
        "get_current_weather",
        "Get the current weather for a location",
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "City and state, e.g. San Francisco, CA"},
                "unit": {"type": "string", "enum": ["celsius", "fahrenheit"]}
            },
            "required": ["location"]
        }),
    )
}

fn build_provider_from_env() -> Option<(OpenAiChatProvider, String)> {
    let Some(endpoint) = load_env_var("OPENAI_CHAT_ENDPOINT") else {
        eprintln!("skip live test: OPENAI_CHAT_ENDPOINT missing");
        return None;
    };
    let Some(api_key) = load_env_var("OPENAI_CHAT_KEY") else {
        eprintln!("skip live test: OPENAI_CHAT_KEY missing");
        return None;
    };
    let Some(model) = load_env_var("OPENAI_CHAT_MODEL") else {
        eprintln!("skip live test: OPENAI_CHAT_MODEL missing");
        return None;
    };

    let transport = default_dyn_transport().expect("transport");
    let provider = OpenAiChatProvider::new(transport, api_key)
        .with_base_url(endpoint)
        .with_default_model(model.clone());
    Some((provider, model))
}

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
