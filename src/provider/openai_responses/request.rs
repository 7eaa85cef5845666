use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{
    ChatMessage, ChatMessagePart, ChatRequest, ChatRole, ImagePart, MediaSource, ResponseFormat,
    ToolCall, ToolChoice, ToolDefinition, ToolInvocation, ToolKind,
};

/// Builds the request body expected by the OpenAI Responses API.
pub(crate) fn build_openai_responses_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, LLMError> {
    let options = &request.options;
    let mut body = Map::new();
    body.insert("model".into(), json!(model));

    // System text folds into `instructions`; everything else becomes input items.
    let mut instructions = Vec::new();
    let mut input = Vec::new();
    for message in &request.messages {
        match message.role {
            ChatRole::System => instructions.extend(message.text()),
            ChatRole::Tool => input.push(convert_tool_output(message)?),
            ChatRole::Assistant => convert_assistant(message, &mut input),
            ChatRole::User | ChatRole::Unknown => input.push(convert_user(message)?),
        }
    }
    if !instructions.is_empty() {
        body.insert("instructions".into(), json!(instructions.join("\n\n")));
    }
    body.insert("input".into(), Value::Array(input));

    if let Some(temperature) = options.temperature {
        body.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".into(), json!(top_p));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        body.insert("max_output_tokens".into(), json!(max_tokens));
    }
    if let Some(parallel) = options.parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), json!(parallel));
    }
    if let Some(previous) = &options.previous_response_id {
        body.insert("previous_response_id".into(), json!(previous));
    }
    if let Some(background) = options.background {
        body.insert("background".into(), json!(background));
    }
    if options.stop.is_some()
        || options.seed.is_some()
        || options.presence_penalty.is_some()
        || options.frequency_penalty.is_some()
    {
        tracing::debug!("responses surface ignores stop, seed and penalty options");
    }

    if let Some(reasoning) = &options.reasoning {
        let mut obj = Map::new();
        if let Some(effort) = &reasoning.effort {
            obj.insert("effort".into(), json!(effort.as_str()));
        }
        if reasoning.include_summary {
            obj.insert("summary".into(), json!("auto"));
        }
        obj.extend(reasoning.extra.clone());
        if !obj.is_empty() {
            body.insert("reasoning".into(), Value::Object(obj));
        }
    }

    if !request.tools.is_empty() {
        body.insert(
            "tools".into(),
            Value::Array(request.tools.iter().map(convert_tool).collect()),
        );
    }
    if let Some(choice) = &request.tool_choice {
        body.insert("tool_choice".into(), convert_tool_choice(choice));
    }
    if let Some(format) = &request.response_format {
        body.insert("text".into(), convert_text_config(format));
    }
    if let Some(metadata) = &request.metadata {
        body.insert(
            "metadata".into(),
            Value::Object(metadata.clone().into_iter().collect()),
        );
    }

    // include, service_tier, store, user and the like
    for (key, value) in &options.extra {
        body.insert(key.clone(), value.clone());
    }
    body.insert("stream".into(), json!(stream));
    Ok(Value::Object(body))
}

fn convert_user(message: &ChatMessage) -> Result<Value, LLMError> {
    let mut content = Vec::new();
    match message.parts.as_deref() {
        Some(parts) if !parts.is_empty() => {
            for part in parts {
                if let Some(item) = convert_input_part(part)? {
                    content.push(item);
                }
            }
        }
        _ => {
            if let Some(text) = &message.content {
                content.push(json!({"type": "input_text", "text": text}));
            }
        }
    }
    Ok(json!({"type": "message", "role": "user", "content": content}))
}

fn convert_input_part(part: &ChatMessagePart) -> Result<Option<Value>, LLMError> {
    let item = match part {
        ChatMessagePart::Text(text) => json!({"type": "input_text", "text": text.text}),
        ChatMessagePart::Image(image) => convert_image(image),
        ChatMessagePart::Audio(audio) => json!({
            "type": "input_audio",
            "input_audio": {"data": audio.data, "format": audio.format},
        }),
        ChatMessagePart::FileLink(link) => {
            if link.file_uri.starts_with("http://") || link.file_uri.starts_with("https://") {
                json!({"type": "input_file", "file_url": link.file_uri})
            } else {
                json!({"type": "input_file", "file_id": link.file_uri})
            }
        }
        ChatMessagePart::Document(doc) => {
            let mut file = match &doc.source {
                MediaSource::FileId { file_id } => json!({"type": "input_file", "file_id": file_id}),
                MediaSource::Url { url } => json!({"type": "input_file", "file_url": url}),
                MediaSource::Base64 { data, mime_type } => json!({
                    "type": "input_file",
                    "file_data": format!(
                        "data:{};base64,{data}",
                        mime_type.as_deref().unwrap_or("application/pdf")
                    ),
                }),
            };
            if let Some(title) = &doc.title {
                file["filename"] = json!(title);
            }
            file
        }
        ChatMessagePart::Reasoning(_) => return Ok(None),
        ChatMessagePart::SearchResult(_) | ChatMessagePart::Video(_) => {
            return Err(LLMError::UnsupportedFeature {
                feature: "openai_responses_content_part",
            });
        }
    };
    Ok(Some(item))
}

fn convert_image(image: &ImagePart) -> Value {
    let detail = image.detail.map(|d| d.as_str()).unwrap_or("auto");
    match &image.source {
        MediaSource::Url { url } => {
            json!({"type": "input_image", "image_url": url, "detail": detail})
        }
        MediaSource::Base64 { data, mime_type } => json!({
            "type": "input_image",
            "image_url": format!("data:{};base64,{data}", mime_type.as_deref().unwrap_or("image/png")),
            "detail": detail,
        }),
        MediaSource::FileId { file_id } => {
            json!({"type": "input_image", "file_id": file_id, "detail": detail})
        }
    }
}

/// Assistant turns replay as an output message followed by one item per tool call.
fn convert_assistant(message: &ChatMessage, input: &mut Vec<Value>) {
    if let Some(text) = message.text().filter(|t| !t.is_empty()) {
        input.push(json!({
            "type": "message",
            "role": "assistant",
            "content": [{"type": "output_text", "text": text}],
        }));
    }
    for call in message.tool_calls.iter().flatten() {
        input.push(convert_tool_call(call));
    }
}

fn convert_tool_call(call: &ToolCall) -> Value {
    match &call.call {
        ToolInvocation::Function { function } => json!({
            "type": "function_call",
            "call_id": call.id,
            "name": function.name,
            "arguments": function.arguments,
        }),
        ToolInvocation::Custom { custom } => json!({
            "type": "custom_tool_call",
            "call_id": call.id,
            "name": custom.name,
            "input": custom.input,
        }),
    }
}

fn convert_tool_output(message: &ChatMessage) -> Result<Value, LLMError> {
    let call_id = message
        .tool_call_id
        .as_deref()
        .ok_or_else(|| LLMError::Validation {
            message: "tool message missing tool_call_id".to_string(),
        })?;
    Ok(json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": message.text().unwrap_or_default(),
    }))
}

fn convert_tool(tool: &ToolDefinition) -> Value {
    let mut value = match &tool.kind {
        ToolKind::Function => {
            let mut obj = json!({
                "type": "function",
                "name": tool.name,
                "parameters": tool
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            });
            if let Some(description) = &tool.description {
                obj["description"] = json!(description);
            }
            obj
        }
        ToolKind::FileSearch => json!({"type": "file_search"}),
        ToolKind::WebSearch => json!({"type": "web_search_preview"}),
        ToolKind::ComputerUse => json!({"type": "computer_use_preview"}),
        ToolKind::CodeInterpreter => {
            json!({"type": "code_interpreter", "container": {"type": "auto"}})
        }
        ToolKind::Custom {
            config: Some(config),
            ..
        } => config.clone(),
        ToolKind::Custom { name, config: None } => json!({"type": name, "name": tool.name}),
    };
    // built-in tools take their settings (vector_store_ids, display size, ...) from metadata
    if let (Some(obj), Some(metadata)) = (value.as_object_mut(), &tool.metadata) {
        obj.extend(metadata.clone());
    }
    value
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({"type": "function", "name": name}),
        ToolChoice::Custom(value) => value.clone(),
    }
}

fn convert_text_config(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({"format": {"type": "text"}}),
        ResponseFormat::JsonObject => json!({"format": {"type": "json_object"}}),
        ResponseFormat::JsonSchema { name, schema } => json!({
            "format": {
                "type": "json_schema",
                "name": name.as_deref().unwrap_or("response"),
                "schema": schema,
                "strict": true,
            }
        }),
        // the whole `text` object, so callers can set verbosity alongside the format
        ResponseFormat::Custom(value) => value.clone(),
    }
}
