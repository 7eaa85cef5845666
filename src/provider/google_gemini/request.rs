use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::types::{
    ChatMessage, ChatMessagePart, ChatRequest, ChatRole, MediaSource, ResponseFormat, ToolChoice,
    ToolDefinition, ToolKind,
};

/// Builds a GenerateContent request body.
///
/// The model travels in the URL path (`models/{model}:generateContent`) and streaming
/// is chosen by the endpoint, so neither appears in the body.
pub(crate) fn build_gemini_body(
    request: &ChatRequest,
    _model: &str,
    _stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();

    let mut system = Vec::new();
    let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for (position, message) in request.messages.iter().enumerate() {
        if message.role == ChatRole::System {
            if let Some(text) = message.text() {
                system.push(text);
            }
            continue;
        }
        let role = match message.role {
            ChatRole::Assistant => "model",
            _ => "user",
        };
        let parts = convert_message(message, &request.messages[..position])?;
        if parts.is_empty() {
            continue;
        }
        // parallel function responses have to share one content entry
        match contents.last_mut() {
            Some((last_role, last)) if *last_role == role => last.extend(parts),
            _ => contents.push((role, parts)),
        }
    }
    if contents.is_empty() {
        return Err(LLMError::Validation {
            message: "Gemini GenerateContent request requires at least one content message"
                .to_string(),
        });
    }
    body.insert(
        "contents".into(),
        Value::Array(
            contents
                .into_iter()
                .map(|(role, parts)| json!({"role": role, "parts": parts}))
                .collect(),
        ),
    );
    if !system.is_empty() {
        body.insert(
            "systemInstruction".into(),
            json!({"parts": [{"text": system.join("\n\n")}]}),
        );
    }

    let generation_config = build_generation_config(request);
    if !generation_config.is_empty() {
        body.insert("generationConfig".into(), Value::Object(generation_config));
    }

    if !request.tools.is_empty() {
        body.insert("tools".into(), Value::Array(convert_tools(&request.tools)?));
    }
    if let Some(choice) = &request.tool_choice {
        body.insert("toolConfig".into(), convert_tool_choice(choice));
    }
    if request.metadata.is_some() {
        tracing::debug!("google_gemini ignores request metadata");
    }

    // safetySettings, cachedContent and similar vendor fields
    for (key, value) in &request.options.extra {
        body.insert(key.clone(), value.clone());
    }

    Ok(Value::Object(body))
}

fn convert_message(message: &ChatMessage, history: &[ChatMessage]) -> Result<Vec<Value>, LLMError> {
    if message.role == ChatRole::Tool {
        let name = function_name_for(message, history);
        let content = message.text().unwrap_or_default();
        let response = match message.tool_invocation_succeeded {
            Some(false) => json!({"error": content}),
            _ => json!({"content": content}),
        };
        let mut function_response = json!({"name": name, "response": response});
        if let Some(id) = &message.tool_call_id {
            function_response["id"] = json!(id);
        }
        return Ok(vec![json!({"functionResponse": function_response})]);
    }

    let mut parts = Vec::new();
    match &message.parts {
        Some(message_parts) => {
            for part in message_parts {
                if let Some(part) = convert_part(part)? {
                    parts.push(part);
                }
            }
        }
        None => {
            if let Some(text) = message.content.as_deref().filter(|t| !t.is_empty()) {
                parts.push(json!({"text": text}));
            }
        }
    }
    for call in message.tool_calls.iter().flatten() {
        let mut function_call = json!({
            "name": call.name(),
            "args": Value::Object(call.replay_arguments()),
        });
        // functionResponse echoes the same id
        if let Some(id) = &call.id {
            function_call["id"] = json!(id);
        }
        parts.push(json!({"functionCall": function_call}));
    }
    Ok(parts)
}

/// Gemini answers function calls by name, so find the call this tool message answers.
fn function_name_for(message: &ChatMessage, history: &[ChatMessage]) -> String {
    let id = message.tool_call_id.as_deref();
    history
        .iter()
        .rev()
        .flat_map(|m| m.tool_calls.iter().flatten())
        .find(|call| call.id.as_deref() == id && id.is_some())
        .map(|call| call.name().to_string())
        .or_else(|| message.name.clone())
        .or_else(|| message.tool_call_id.clone())
        .unwrap_or_default()
}

fn convert_part(part: &ChatMessagePart) -> Result<Option<Value>, LLMError> {
    let value = match part {
        ChatMessagePart::Text(text) => json!({"text": text.text}),
        ChatMessagePart::Image(image) => convert_source(&image.source, "image/jpeg"),
        ChatMessagePart::Audio(audio) => json!({
            "inlineData": {"mimeType": format!("audio/{}", audio.format), "data": audio.data}
        }),
        ChatMessagePart::FileLink(link) => json!({
            "fileData": {
                "mimeType": link.mime_type.as_deref().unwrap_or("application/octet-stream"),
                "fileUri": link.file_uri,
            }
        }),
        ChatMessagePart::Document(doc) => convert_source(&doc.source, "application/pdf"),
        ChatMessagePart::Video(video) => convert_source(&video.source, "video/mp4"),
        ChatMessagePart::Reasoning(reasoning) => match &reasoning.signature {
            Some(signature) if !reasoning.redacted => json!({
                "text": reasoning.content.clone().unwrap_or_default(),
                "thought": true,
                "thoughtSignature": signature,
            }),
            _ => return Ok(None),
        },
        ChatMessagePart::SearchResult(_) => {
            return Err(LLMError::UnsupportedFeature {
                feature: "gemini_search_result_part",
            });
        }
    };
    Ok(Some(value))
}

fn convert_source(source: &MediaSource, default_mime: &str) -> Value {
    match source {
        MediaSource::Base64 { data, mime_type } => json!({
            "inlineData": {
                "mimeType": mime_type.as_deref().unwrap_or(default_mime),
                "data": data,
            }
        }),
        MediaSource::Url { url } => json!({
            "fileData": {"mimeType": default_mime, "fileUri": url}
        }),
        MediaSource::FileId { file_id } => json!({
            "fileData": {"mimeType": default_mime, "fileUri": file_id}
        }),
    }
}

fn build_generation_config(request: &ChatRequest) -> Map<String, Value> {
    let options = &request.options;
    let mut config = Map::new();
    if let Some(temperature) = options.temperature {
        config.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = options.top_p {
        config.insert("topP".into(), json!(top_p));
    }
    if let Some(max_tokens) = options.max_output_tokens {
        config.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if let Some(penalty) = options.presence_penalty {
        config.insert("presencePenalty".into(), json!(penalty));
    }
    if let Some(penalty) = options.frequency_penalty {
        config.insert("frequencyPenalty".into(), json!(penalty));
    }
    if let Some(stop) = &options.stop {
        config.insert("stopSequences".into(), json!(stop));
    }
    if let Some(seed) = options.seed {
        config.insert("seed".into(), json!(seed));
    }
    if let Some(reasoning) = &options.reasoning {
        let mut thinking = Map::new();
        if let Some(budget) = reasoning.budget_tokens {
            thinking.insert("thinkingBudget".into(), json!(budget));
        }
        if reasoning.include_summary {
            thinking.insert("includeThoughts".into(), json!(true));
        }
        thinking.extend(reasoning.extra.clone());
        if !thinking.is_empty() {
            config.insert("thinkingConfig".into(), Value::Object(thinking));
        }
    }

    match &request.response_format {
        None | Some(ResponseFormat::Text) => {}
        Some(ResponseFormat::JsonObject) => {
            config.insert("responseMimeType".into(), json!("application/json"));
        }
        Some(ResponseFormat::JsonSchema { schema, .. }) => {
            config.insert("responseMimeType".into(), json!("application/json"));
            config.insert("responseSchema".into(), schema.clone());
        }
        Some(ResponseFormat::Custom(Value::Object(custom))) => config.extend(custom.clone()),
        Some(ResponseFormat::Custom(_)) => {
            tracing::debug!("google_gemini ignores a non-object custom response_format");
        }
    }
    config
}

fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<Value>, LLMError> {
    let mut declarations = Vec::new();
    let mut result = Vec::new();
    for tool in tools {
        match &tool.kind {
            ToolKind::Function => {
                let mut decl = Map::new();
                decl.insert("name".into(), json!(tool.name));
                if let Some(desc) = &tool.description {
                    decl.insert("description".into(), json!(desc));
                }
                if let Some(schema) = &tool.input_schema {
                    decl.insert("parameters".into(), schema.clone());
                }
                declarations.push(Value::Object(decl));
            }
            ToolKind::WebSearch => result.push(json!({"googleSearch": {}})),
            ToolKind::CodeInterpreter => result.push(json!({"codeExecution": {}})),
            ToolKind::Custom { name, config } => {
                let tool = config.clone().unwrap_or_else(|| {
                    Value::Object(Map::from_iter([(name.clone(), json!({}))]))
                });
                result.push(tool);
            }
            ToolKind::FileSearch => {
                return Err(LLMError::UnsupportedFeature {
                    feature: "gemini_file_search_tool",
                });
            }
            ToolKind::ComputerUse => {
                return Err(LLMError::UnsupportedFeature {
                    feature: "gemini_computer_use_tool",
                });
            }
        }
    }
    if !declarations.is_empty() {
        result.insert(0, json!({"functionDeclarations": declarations}));
    }
    Ok(result)
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"functionCallingConfig": {"mode": "AUTO"}}),
        ToolChoice::Any => json!({"functionCallingConfig": {"mode": "ANY"}}),
        ToolChoice::None => json!({"functionCallingConfig": {"mode": "NONE"}}),
        ToolChoice::Tool { name } => json!({
            "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]}
        }),
        ToolChoice::Custom(value) => value.clone(),
    }
}
