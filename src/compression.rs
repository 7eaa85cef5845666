//! Context compression: replacing older history with model-written summaries.
//!
//! A [`CompressionStrategy`] decides when and how much to compress; a
//! [`MessageSummarizer`] does the summarizing. The two are registered on a
//! [`Conversation`] independently.

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::client::LLMClient;
use crate::conversation::Conversation;
use crate::error::LLMError;
use crate::types::{ChatMessage, ChatOptions, ChatRequest, ChatRole, TokenEstimator};

const SUMMARY_HEADER: &str = "[Summary of earlier conversation]";

const DEFAULT_INSTRUCTIONS: &str = "Summarize the following conversation excerpt. Keep facts, \
decisions, names, numbers and open questions. Write in the language of the excerpt and \
reply with the summary only.";

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOptions {
    /// Upper bound on the characters sent in one summarization call.
    pub chunk_char_budget: usize,
    pub preserve_system_messages: bool,
    /// Number of most recent non-system messages kept verbatim, with anything between them.
    pub keep_recent: usize,
    pub summary_model: Option<String>,
    pub summary_instructions: Option<String>,
    pub max_summary_tokens: Option<u32>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            chunk_char_budget: 10_000,
            preserve_system_messages: true,
            keep_recent: 4,
            summary_model: None,
            summary_instructions: None,
            max_summary_tokens: None,
        }
    }
}

/// Decides when a conversation is compressed and with which options.
pub trait CompressionStrategy: Send + Sync {
    fn should_compress(&self, conversation: &Conversation) -> bool;

    fn options(&self, _conversation: &Conversation) -> CompressionOptions {
        CompressionOptions::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCompress;

impl CompressionStrategy for NeverCompress {
    fn should_compress(&self, _conversation: &Conversation) -> bool {
        false
    }
}

/// Compresses once the estimated prompt size passes a token threshold.
#[derive(Debug, Clone)]
pub struct TokenThresholdStrategy {
    threshold: usize,
    estimator: TokenEstimator,
    options: CompressionOptions,
}

impl TokenThresholdStrategy {
    pub fn new(threshold: usize, estimator: TokenEstimator) -> Self {
        Self {
            threshold,
            estimator,
            options: CompressionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompressionOptions) -> Self {
        self.options = options;
        self
    }
}

impl CompressionStrategy for TokenThresholdStrategy {
    fn should_compress(&self, conversation: &Conversation) -> bool {
        let estimate = self.estimator.estimate_messages(conversation.messages());
        tracing::trace!(
            estimate = estimate.total,
            threshold = self.threshold,
            "checking compression threshold"
        );
        estimate.total > self.threshold
    }

    fn options(&self, _conversation: &Conversation) -> CompressionOptions {
        self.options.clone()
    }
}

/// Turns a slice of history into replacement messages.
#[async_trait]
pub trait MessageSummarizer: Send + Sync {
    /// # Errors
    ///
    /// Only cancellation is an error; individual summarization failures degrade to
    /// placeholder messages.
    async fn summarize_messages(
        &self,
        messages: &[ChatMessage],
        options: &CompressionOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, LLMError>;
}

/// Summarizes history in character-bounded chunks, concurrently, on one model handle.
#[derive(Clone)]
pub struct ChunkedSummarizer {
    client: LLMClient,
    handle: String,
}

impl ChunkedSummarizer {
    pub fn new(client: LLMClient, handle: impl Into<String>) -> Self {
        Self {
            client,
            handle: handle.into(),
        }
    }

    async fn summarize_chunk(
        &self,
        chunk: &[ChatMessage],
        options: &CompressionOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage, LLMError> {
        let instructions = options
            .summary_instructions
            .as_deref()
            .unwrap_or(DEFAULT_INSTRUCTIONS);
        let request = ChatRequest::new(vec![
            ChatMessage::system(instructions),
            ChatMessage::user(transcript(chunk)),
        ])
        .with_options(ChatOptions {
            model: options.summary_model.clone(),
            max_output_tokens: options.max_summary_tokens,
            ..ChatOptions::default()
        });

        let result = self
            .client
            .create_chat_completion(&self.handle, request, cancel)
            .await?;
        let summary = result
            .first_message()?
            .text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(LLMError::NoChoices)?;
        Ok(ChatMessage::user(format!("{SUMMARY_HEADER}\n{summary}")))
    }
}

#[async_trait]
impl MessageSummarizer for ChunkedSummarizer {
    async fn summarize_messages(
        &self,
        messages: &[ChatMessage],
        options: &CompressionOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, LLMError> {
        let chunks = chunk_messages(messages, options.chunk_char_budget);
        tracing::debug!(
            messages = messages.len(),
            chunks = chunks.len(),
            "summarizing history"
        );
        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.summarize_chunk(chunk, options, cancel)),
        )
        .await;

        if cancel.is_cancelled() {
            return Err(LLMError::aborted());
        }
        Ok(chunks
            .iter()
            .zip(results)
            .map(|(chunk, result)| {
                result.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, messages = chunk.len(), "chunk summary failed");
                    ChatMessage::user(placeholder(chunk.len()))
                })
            })
            .collect())
    }
}

fn placeholder(count: usize) -> String {
    format!("[{count} messages from this conversation]")
}

fn transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(message.role.as_str());
        out.push_str(": ");
        out.push_str(&message.text().unwrap_or_default());
        for call in message.tool_calls.iter().flatten() {
            out.push_str(&format!("\n[call {}({})]", call.name(), call.arguments()));
        }
    }
    out
}

/// Splits history into contiguous chunks of at most `budget` characters.
/// A message larger than the budget forms a chunk of its own.
pub(crate) fn chunk_messages(messages: &[ChatMessage], budget: usize) -> Vec<&[ChatMessage]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0;
    for (index, message) in messages.iter().enumerate() {
        let len = message.char_len();
        if index > start && size + len > budget {
            chunks.push(&messages[start..index]);
            start = index;
            size = 0;
        }
        size += len;
    }
    if start < messages.len() {
        chunks.push(&messages[start..]);
    }
    chunks
}

/// Builds the compressed history: system messages from the summarized span, then
/// summaries, then the recent tail exactly as it was.
///
/// `keep_recent` counts non-system messages when system messages are preserved. Returns
/// `None` when there is nothing old enough to summarize.
pub(crate) async fn compress_messages(
    messages: &[ChatMessage],
    options: &CompressionOptions,
    summarizer: &dyn MessageSummarizer,
    cancel: &CancellationToken,
) -> Result<Option<Vec<ChatMessage>>, LLMError> {
    let hoisted = |message: &ChatMessage| {
        options.preserve_system_messages && message.role == ChatRole::System
    };

    let mut split = messages.len();
    let mut kept = 0;
    while split > 0 && kept < options.keep_recent {
        split -= 1;
        if !hoisted(&messages[split]) {
            kept += 1;
        }
    }
    // a tool result must stay next to the call that produced it
    while split > 0 && split < messages.len() && messages[split].role == ChatRole::Tool {
        split -= 1;
    }

    let (system, older): (Vec<ChatMessage>, Vec<ChatMessage>) =
        messages[..split].iter().cloned().partition(|message| hoisted(message));
    if older.is_empty() {
        return Ok(None);
    }

    let summaries = summarizer.summarize_messages(&older, options, cancel).await?;
    let mut compressed = system;
    compressed.extend(summaries);
    compressed.extend_from_slice(&messages[split..]);
    Ok(Some(compressed))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::{ChatStream, LLMProvider};
    use crate::types::{
        CapabilityDescriptor, ChatChoice, ChatResult, ToolCall, TokenizerFamily, Vendor,
    };

    /// Answers with the number of transcript lines; fails when the transcript says FAIL.
    struct CountingSummarizer {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LLMProvider for CountingSummarizer {
        async fn chat(
            &self,
            request: ChatRequest,
            _cancel: &CancellationToken,
        ) -> Result<ChatResult, LLMError> {
            *self.calls.lock().unwrap() += 1;
            let transcript = request.messages[1].text().unwrap_or_default();
            if transcript.contains("FAIL") {
                return Err(LLMError::provider("counting", "summary refused"));
            }
            let first = transcript.lines().next().unwrap_or_default().to_string();
            Ok(ChatResult {
                choices: vec![ChatChoice {
                    message: Some(ChatMessage::assistant(format!(" starts with {first} "))),
                    ..ChatChoice::default()
                }],
                ..ChatResult::default()
            })
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
            _cancel: &CancellationToken,
        ) -> Result<ChatStream, LLMError> {
            Err(LLMError::UnsupportedFeature { feature: "stream" })
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            CapabilityDescriptor::default()
        }

        fn name(&self) -> &'static str {
            "counting"
        }

        fn vendor(&self) -> Vendor {
            Vendor::Custom
        }
    }

    fn summarizer() -> (ChunkedSummarizer, Arc<CountingSummarizer>) {
        let provider = Arc::new(CountingSummarizer {
            calls: Mutex::new(0),
        });
        let client = LLMClient::builder()
            .register_handle("summary", provider.clone())
            .build();
        (ChunkedSummarizer::new(client, "summary"), provider)
    }

    fn message(role: ChatRole, text: &str) -> ChatMessage {
        ChatMessage::new(role, text)
    }

    #[test]
    fn oversized_messages_form_their_own_chunk() {
        let messages = vec![
            message(ChatRole::User, "aaaa"),
            message(ChatRole::Assistant, &"b".repeat(50)),
            message(ChatRole::User, "cccc"),
            message(ChatRole::Assistant, "dddd"),
        ];
        let chunks = chunk_messages(&messages, 10);
        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.len()).collect();
        assert_eq!(sizes, vec![1, 1, 2]);
        assert!(chunk_messages(&[], 10).is_empty());
    }

    #[tokio::test]
    async fn failed_chunks_become_placeholders_in_order() {
        let (summarizer, provider) = summarizer();
        let messages = vec![
            message(ChatRole::User, "alpha question"),
            message(ChatRole::Assistant, "alpha answer"),
            message(ChatRole::User, "FAIL this one"),
            message(ChatRole::Assistant, "FAIL again"),
            message(ChatRole::User, "gamma question"),
        ];
        let options = CompressionOptions {
            chunk_char_budget: 30,
            ..CompressionOptions::default()
        };
        let summaries = summarizer
            .summarize_messages(&messages, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*provider.calls.lock().unwrap(), 3);
        assert_eq!(summaries.len(), 3);
        assert_eq!(
            summaries[0].content.as_deref(),
            Some("[Summary of earlier conversation]\nstarts with user: alpha question")
        );
        assert_eq!(
            summaries[1].content.as_deref(),
            Some("[2 messages from this conversation]")
        );
        assert!(summaries[2].content.as_deref().unwrap().contains("gamma"));
    }

    #[tokio::test]
    async fn compression_keeps_system_and_recent_tail() {
        let (summarizer, _) = summarizer();
        let mut messages = vec![message(ChatRole::System, "be brief")];
        for turn in 0..4 {
            messages.push(message(ChatRole::User, &format!("question {turn}")));
            messages.push(message(ChatRole::Assistant, &format!("answer {turn}")));
        }
        let options = CompressionOptions {
            keep_recent: 2,
            ..CompressionOptions::default()
        };
        let compressed = compress_messages(&messages, &options, &summarizer, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(compressed.len(), 4);
        assert_eq!(compressed[0].role, ChatRole::System);
        assert!(compressed[1].content.as_deref().unwrap().starts_with(SUMMARY_HEADER));
        assert_eq!(compressed[2].content.as_deref(), Some("question 3"));
        assert_eq!(compressed[3].content.as_deref(), Some("answer 3"));
    }

    #[tokio::test]
    async fn late_system_messages_keep_their_position() {
        let (summarizer, _) = summarizer();
        let messages = vec![
            message(ChatRole::System, "be brief"),
            message(ChatRole::User, "question 0"),
            message(ChatRole::Assistant, "answer 0"),
            message(ChatRole::User, "question 1"),
            message(ChatRole::Assistant, "answer 1"),
            message(ChatRole::System, "switch to French"),
            message(ChatRole::User, "question 2"),
        ];
        let options = CompressionOptions {
            keep_recent: 2,
            ..CompressionOptions::default()
        };
        let compressed = compress_messages(&messages, &options, &summarizer, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        let texts: Vec<&str> = compressed
            .iter()
            .map(|m| m.content.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(compressed.len(), 5);
        assert_eq!(texts[0], "be brief");
        assert!(texts[1].starts_with(SUMMARY_HEADER));
        assert_eq!(texts[2], "answer 1");
        assert_eq!(texts[3], "switch to French");
        assert_eq!(texts[4], "question 2");
    }

    #[tokio::test]
    async fn tail_never_starts_with_a_tool_result() {
        let (summarizer, _) = summarizer();
        let messages = vec![
            message(ChatRole::User, "weather?"),
            ChatMessage::assistant("")
                .with_tool_calls(vec![ToolCall::function("call_1", "weather", "{}")]),
            ChatMessage::tool_result("call_1", "sunny", true),
            message(ChatRole::Assistant, "It is sunny."),
        ];
        let options = CompressionOptions {
            keep_recent: 2,
            ..CompressionOptions::default()
        };
        let compressed = compress_messages(&messages, &options, &summarizer, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(compressed.len(), 4);
        assert!(compressed[1].has_tool_calls());
        assert_eq!(compressed[2].role, ChatRole::Tool);

        let short = &messages[..2];
        assert!(
            compress_messages(short, &options, &summarizer, &CancellationToken::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn conversation_compresses_past_threshold() {
        let (summarizer, provider) = summarizer();
        let client = LLMClient::builder()
            .register_handle("summary", provider.clone())
            .build();
        let strategy = TokenThresholdStrategy::new(10, TokenEstimator::new(TokenizerFamily::OpenAi))
            .with_options(CompressionOptions {
                keep_recent: 1,
                ..CompressionOptions::default()
            });
        let mut conversation = client
            .conversation("summary")
            .with_compression(Arc::new(strategy), Arc::new(summarizer));
        conversation.append_system_message("be brief");
        for turn in 0..3 {
            conversation.append_user_input(format!("a fairly long question number {turn}"));
            conversation.append_assistant_message(format!("a fairly long answer number {turn}"));
        }

        assert!(conversation.compress(&CancellationToken::new()).await.unwrap());
        let messages = conversation.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages.iter().all(|m| m.id.is_some()));

        let mut idle = client
            .conversation("summary")
            .with_compression(Arc::new(NeverCompress), Arc::new(ChunkedSummarizer::new(client.clone(), "summary")));
        idle.append_user_input("hi");
        assert!(!idle.compress(&CancellationToken::new()).await.unwrap());
    }
}
