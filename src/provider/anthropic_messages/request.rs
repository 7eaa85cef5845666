use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{
    ChatMessage, ChatMessagePart, ChatRequest, ChatRole, MediaSource, ReasoningOptions,
    ToolChoice, ToolDefinition, ToolKind,
};

/// Anthropic rejects requests without `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Builds a Messages API request body.
pub(crate) fn build_anthropic_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".into(), json!(model));

    let mut system = Vec::new();
    let mut messages: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in &request.messages {
        if message.role == ChatRole::System {
            if let Some(text) = message.text() {
                system.push(text);
            }
            continue;
        }
        let role = match message.role {
            ChatRole::Assistant => "assistant",
            _ => "user",
        };
        let blocks = convert_message(message)?;
        if blocks.is_empty() {
            continue;
        }
        // consecutive same-role turns merge, which keeps parallel tool results together
        match messages.last_mut() {
            Some((last_role, content)) if *last_role == role => content.extend(blocks),
            _ => messages.push((role, blocks)),
        }
    }
    if messages.is_empty() {
        return Err(LLMError::Validation {
            message: "Anthropic Messages request requires at least one user/assistant message"
                .to_string(),
        });
    }
    body.insert(
        "messages".into(),
        Value::Array(
            messages
                .into_iter()
                .map(|(role, content)| json!({"role": role, "content": content}))
                .collect(),
        ),
    );
    if !system.is_empty() {
        body.insert("system".into(), json!(system.join("\n\n")));
    }

    let options = &request.options;
    body.insert(
        "max_tokens".into(),
        json!(options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    if let Some(temperature) = options.temperature {
        body.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".into(), json!(top_p));
    }
    if let Some(stop) = &options.stop {
        body.insert("stop_sequences".into(), json!(stop));
    }
    if let Some(thinking) = options.reasoning.as_ref().and_then(build_thinking) {
        body.insert("thinking".into(), thinking);
    }

    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(convert_tool)
            .collect::<Result<Vec<_>, _>>()?;
        body.insert("tools".into(), Value::Array(tools));
    }
    if let Some(choice) = &request.tool_choice {
        body.insert(
            "tool_choice".into(),
            convert_tool_choice(choice, options.parallel_tool_calls.unwrap_or(true)),
        );
    }
    if request.response_format.is_some() {
        tracing::debug!("anthropic_messages ignores response_format");
    }
    if let Some(metadata) = &request.metadata {
        body.insert(
            "metadata".into(),
            Value::Object(metadata.clone().into_iter().collect()),
        );
    }

    for (key, value) in &options.extra {
        body.insert(key.clone(), value.clone());
    }
    body.insert("stream".into(), json!(stream));

    Ok(Value::Object(body))
}

fn convert_message(message: &ChatMessage) -> Result<Vec<Value>, LLMError> {
    if message.role == ChatRole::Tool {
        let tool_use_id = message
            .tool_call_id
            .clone()
            .ok_or_else(|| LLMError::Validation {
                message: "tool message requires tool_call_id".to_string(),
            })?;
        return Ok(vec![json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": message.text().unwrap_or_default(),
            "is_error": message.tool_invocation_succeeded == Some(false),
        })]);
    }

    let mut blocks = Vec::new();
    match &message.parts {
        Some(parts) => {
            for part in parts {
                if let Some(block) = convert_part(part)? {
                    blocks.push(block);
                }
            }
        }
        None => {
            if let Some(text) = message.content.as_deref().filter(|t| !t.is_empty()) {
                blocks.push(json!({"type": "text", "text": text}));
            }
        }
    }

    for call in message.tool_calls.iter().flatten() {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name(),
            "input": Value::Object(call.replay_arguments()),
        }));
    }
    Ok(blocks)
}

fn convert_part(part: &ChatMessagePart) -> Result<Option<Value>, LLMError> {
    let block = match part {
        ChatMessagePart::Text(text) => json!({"type": "text", "text": text.text}),
        ChatMessagePart::Image(image) => json!({
            "type": "image",
            "source": convert_source(&image.source, "image/png"),
        }),
        ChatMessagePart::Document(doc) => {
            let mut block = json!({
                "type": "document",
                "source": convert_source(&doc.source, "application/pdf"),
            });
            if let Some(title) = &doc.title {
                block["title"] = json!(title);
            }
            if let Some(context) = &doc.context {
                block["context"] = json!(context);
            }
            if doc.citations_enabled {
                block["citations"] = json!({"enabled": true});
            }
            block
        }
        ChatMessagePart::SearchResult(result) => json!({
            "type": "search_result",
            "source": result.source,
            "title": result.title,
            "content": result
                .content
                .iter()
                .map(|text| json!({"type": "text", "text": text}))
                .collect::<Vec<_>>(),
            "citations": {"enabled": result.citations_enabled},
        }),
        ChatMessagePart::Reasoning(reasoning) if reasoning.redacted => json!({
            "type": "redacted_thinking",
            "data": reasoning.content,
        }),
        ChatMessagePart::Reasoning(reasoning) => match &reasoning.signature {
            Some(signature) => json!({
                "type": "thinking",
                "thinking": reasoning.content.clone().unwrap_or_default(),
                "signature": signature,
            }),
            // unsigned thinking cannot be replayed
            None => return Ok(None),
        },
        ChatMessagePart::Audio(_) | ChatMessagePart::Video(_) | ChatMessagePart::FileLink(_) => {
            return Err(LLMError::UnsupportedFeature {
                feature: "anthropic_messages_media_part",
            });
        }
    };
    Ok(Some(block))
}

fn convert_source(source: &MediaSource, default_mime: &str) -> Value {
    match source {
        MediaSource::Url { url } => json!({"type": "url", "url": url}),
        MediaSource::Base64 { data, mime_type } => json!({
            "type": "base64",
            "media_type": mime_type.as_deref().unwrap_or(default_mime),
            "data": data,
        }),
        MediaSource::FileId { file_id } => json!({"type": "file", "file_id": file_id}),
    }
}

fn build_thinking(reasoning: &ReasoningOptions) -> Option<Value> {
    if let Some(explicit) = reasoning.extra.get("thinking") {
        return Some(explicit.clone());
    }
    let budget = reasoning.budget_tokens?;
    let mut thinking = Map::new();
    thinking.insert("type".into(), json!("enabled"));
    thinking.insert("budget_tokens".into(), json!(budget));
    thinking.extend(reasoning.extra.clone());
    Some(Value::Object(thinking))
}

fn convert_tool(tool: &ToolDefinition) -> Result<Value, LLMError> {
    let mut value = match &tool.kind {
        ToolKind::Function => json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool
                .input_schema
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        }),
        ToolKind::WebSearch => json!({"type": "web_search_20250305", "name": tool.name}),
        ToolKind::CodeInterpreter => json!({"type": "code_execution_20250522", "name": tool.name}),
        ToolKind::Custom { config: Some(config), .. } => config.clone(),
        ToolKind::Custom { name, config: None } => json!({"type": name, "name": tool.name}),
        ToolKind::FileSearch | ToolKind::ComputerUse => {
            return Err(LLMError::UnsupportedFeature {
                feature: "anthropic_messages_builtin_tool",
            });
        }
    };
    if let (Some(obj), Some(metadata)) = (value.as_object_mut(), &tool.metadata) {
        obj.extend(metadata.clone());
    }
    Ok(value)
}

fn convert_tool_choice(choice: &ToolChoice, parallel_tool_calls: bool) -> Value {
    let disable_parallel_tool_use = !parallel_tool_calls;
    match choice {
        ToolChoice::Auto => json!({
            "type": "auto",
            "disable_parallel_tool_use": disable_parallel_tool_use,
        }),
        ToolChoice::Any => json!({
            "type": "any",
            "disable_parallel_tool_use": disable_parallel_tool_use,
        }),
        ToolChoice::Tool { name } => json!({
            "type": "tool",
            "name": name,
            "disable_parallel_tool_use": disable_parallel_tool_use,
        }),
        ToolChoice::None => json!({"type": "none"}),
        ToolChoice::Custom(value) => value.clone(),
    }
}
