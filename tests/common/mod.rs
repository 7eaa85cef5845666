//! Shared helpers for the offline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use polyvox_llm::error::LLMError;
use polyvox_llm::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub enum Reply {
    Json(u16, Value),
    /// SSE body delivered in chunks of the given byte size.
    Sse(String, usize),
    /// SSE body that never ends after the given prefix.
    Hanging(String),
}

/// Replays scripted replies in order and records every request.
#[derive(Default)]
pub struct ReplayTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ReplayTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|request| request.body.as_deref())
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    fn next(&self, request: HttpRequest) -> Reply {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left")
    }
}

#[async_trait]
impl HttpTransport for ReplayTransport {
    async fn send(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpResponse, LLMError> {
        match self.next(request) {
            Reply::Json(status, body) => Ok(HttpResponse {
                status,
                headers: Default::default(),
                body: body.to_string().into_bytes(),
            }),
            _ => panic!("expected a buffered request"),
        }
    }

    async fn send_stream(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpStreamResponse, LLMError> {
        let body = match self.next(request) {
            Reply::Sse(body, size) => {
                let chunks: Vec<Result<Vec<u8>, LLMError>> = body
                    .as_bytes()
                    .chunks(size.max(1))
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                stream::iter(chunks).boxed()
            }
            Reply::Hanging(prefix) => stream::iter([Ok(prefix.into_bytes())])
                .chain(stream::pending())
                .boxed(),
            Reply::Json(status, body) => {
                return Ok(HttpStreamResponse {
                    status,
                    headers: Default::default(),
                    body: stream::iter([Ok(body.to_string().into_bytes())]).boxed(),
                });
            }
        };
        Ok(HttpStreamResponse {
            status: 200,
            headers: Default::default(),
            body,
        })
    }
}

/// `data:`-only SSE body, terminated with `[DONE]`.
pub fn data_sse(chunks: &[Value]) -> String {
    let mut body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// Event-typed SSE body using each payload's `type` field as the event name.
pub fn typed_sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| {
            format!(
                "event: {}\ndata: {}\n\n",
                event["type"].as_str().unwrap(),
                event
            )
        })
        .collect()
}
