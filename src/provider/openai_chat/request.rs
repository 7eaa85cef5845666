use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{
    ChatMessage, ChatMessagePart, ChatRequest, ChatRole, ImagePart, MediaSource, ResponseFormat,
    ToolCall, ToolChoice, ToolDefinition, ToolInvocation, ToolKind,
};

/// Builds the shared Chat Completions body.
///
/// Vendor-specific renames and strips are applied afterwards by the request builder.
pub(crate) fn build_openai_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let options = &request.options;
    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert(
        "messages".into(),
        Value::Array(
            request
                .messages
                .iter()
                .map(convert_message)
                .collect::<Result<_, _>>()?,
        ),
    );

    if let Some(temperature) = options.temperature {
        body.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".into(), json!(top_p));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        body.insert("max_tokens".into(), json!(max_tokens));
    }
    if let Some(penalty) = options.presence_penalty {
        body.insert("presence_penalty".into(), json!(penalty));
    }
    if let Some(penalty) = options.frequency_penalty {
        body.insert("frequency_penalty".into(), json!(penalty));
    }
    if let Some(stop) = &options.stop {
        body.insert("stop".into(), json!(stop));
    }
    if let Some(seed) = options.seed {
        body.insert("seed".into(), json!(seed));
    }
    if let Some(parallel) = options.parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), json!(parallel));
    }
    if let Some(reasoning) = &options.reasoning {
        if let Some(effort) = &reasoning.effort {
            body.insert("reasoning_effort".into(), json!(effort.as_str()));
        }
        for (key, value) in &reasoning.extra {
            body.insert(key.clone(), value.clone());
        }
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
        body.insert("tool_choice".into(), convert_tool_choice(choice));
    }
    if let Some(format) = &request.response_format {
        body.insert("response_format".into(), convert_response_format(format));
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
    if stream {
        body.insert("stream_options".into(), json!({"include_usage": true}));
    }
    Ok(Value::Object(body))
}

fn convert_message(message: &ChatMessage) -> Result<Value, LLMError> {
    let mut obj = Map::new();
    let role = match message.role {
        ChatRole::Unknown => ChatRole::User.as_str(),
        role => role.as_str(),
    };
    obj.insert("role".into(), json!(role));
    if let Some(name) = &message.name {
        obj.insert("name".into(), json!(name));
    }

    if message.role == ChatRole::Tool {
        let id = message
            .tool_call_id
            .clone()
            .ok_or_else(|| LLMError::Validation {
                message: "tool message missing tool_call_id".to_string(),
            })?;
        obj.insert("tool_call_id".into(), json!(id));
        obj.insert("content".into(), json!(message.text().unwrap_or_default()));
        return Ok(Value::Object(obj));
    }

    obj.insert("content".into(), convert_content(message)?);
    if let Some(calls) = message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
        obj.insert(
            "tool_calls".into(),
            Value::Array(calls.iter().map(convert_tool_call).collect()),
        );
    }
    Ok(Value::Object(obj))
}

/// Plain string when the message is text only, otherwise a content-part array.
fn convert_content(message: &ChatMessage) -> Result<Value, LLMError> {
    let parts = message.parts.as_deref().unwrap_or_default();
    let multimodal = parts
        .iter()
        .any(|part| !matches!(part, ChatMessagePart::Text(_) | ChatMessagePart::Reasoning(_)));
    if !multimodal {
        return Ok(match message.text() {
            Some(text) => json!(text),
            None => Value::Null,
        });
    }

    let mut content = Vec::new();
    for part in parts {
        match part {
            ChatMessagePart::Text(text) => content.push(json!({"type": "text", "text": text.text})),
            ChatMessagePart::Image(image) => content.push(convert_image(image)),
            ChatMessagePart::Audio(audio) => content.push(json!({
                "type": "input_audio",
                "input_audio": {"data": audio.data, "format": audio.format},
            })),
            ChatMessagePart::FileLink(link) => content.push(json!({
                "type": "file",
                "file": {"file_id": link.file_uri},
            })),
            ChatMessagePart::Document(doc) => match &doc.source {
                MediaSource::FileId { file_id } => {
                    content.push(json!({"type": "file", "file": {"file_id": file_id}}))
                }
                MediaSource::Base64 { data, mime_type } => content.push(json!({
                    "type": "file",
                    "file": {
                        "filename": doc.title.clone().unwrap_or_else(|| "document".into()),
                        "file_data": data_url(mime_type.as_deref().unwrap_or("application/pdf"), data),
                    },
                })),
                MediaSource::Url { .. } => {
                    return Err(LLMError::UnsupportedFeature {
                        feature: "openai_chat_document_url",
                    });
                }
            },
            // reasoning is never replayed on this surface
            ChatMessagePart::Reasoning(_) => {}
            ChatMessagePart::SearchResult(_) | ChatMessagePart::Video(_) => {
                return Err(LLMError::UnsupportedFeature {
                    feature: "openai_chat_content_part",
                });
            }
        }
    }
    Ok(Value::Array(content))
}

fn data_url(mime: &str, data: &str) -> String {
    format!("data:{mime};base64,{data}")
}

fn convert_image(image: &ImagePart) -> Value {
    let url = match &image.source {
        MediaSource::Url { url } => url.clone(),
        MediaSource::Base64 { data, mime_type } => {
            data_url(mime_type.as_deref().unwrap_or("image/png"), data)
        }
        MediaSource::FileId { file_id } => {
            return json!({"type": "file", "file": {"file_id": file_id}});
        }
    };
    let mut image_url = json!({"url": url});
    if let Some(detail) = image.detail {
        image_url["detail"] = json!(detail.as_str());
    }
    json!({"type": "image_url", "image_url": image_url})
}

fn convert_tool_call(call: &ToolCall) -> Value {
    match &call.call {
        ToolInvocation::Function { function } => json!({
            "id": call.id,
            "type": "function",
            "function": {"name": function.name, "arguments": function.arguments},
        }),
        ToolInvocation::Custom { custom } => json!({
            "id": call.id,
            "type": "custom",
            "custom": {"name": custom.name, "input": custom.input},
        }),
    }
}

fn convert_tool(tool: &ToolDefinition) -> Result<Value, LLMError> {
    let mut value = match &tool.kind {
        ToolKind::Function => {
            let mut function = json!({
                "name": tool.name,
                "parameters": tool
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            });
            if let Some(description) = &tool.description {
                function["description"] = json!(description);
            }
            json!({"type": "function", "function": function})
        }
        ToolKind::Custom {
            config: Some(config),
            ..
        } => config.clone(),
        ToolKind::Custom { name, config: None } => json!({"type": name, "name": tool.name}),
        _ => {
            return Err(LLMError::UnsupportedFeature {
                feature: "chat_surface_builtin_tool",
            });
        }
    };
    if let (Some(obj), Some(metadata)) = (value.as_object_mut(), &tool.metadata) {
        obj.extend(metadata.clone());
    }
    Ok(value)
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({"type": "function", "function": {"name": name}}),
        ToolChoice::Custom(value) => value.clone(),
    }
}

pub(crate) fn convert_response_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({"type": "text"}),
        ResponseFormat::JsonObject => json!({"type": "json_object"}),
        ResponseFormat::JsonSchema { name, schema } => json!({
            "type": "json_schema",
            "json_schema": {
                "name": name.as_deref().unwrap_or("response"),
                "schema": schema,
                "strict": true,
            },
        }),
        ResponseFormat::Custom(value) => value.clone(),
    }
}
