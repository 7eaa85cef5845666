//! In-memory transport that replays scripted responses for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;

use super::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};

pub(crate) enum Scripted {
    Json(u16, String),
    Stream(u16, Vec<Vec<u8>>),
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    pub(crate) requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Splits an SSE body into chunks of `size` bytes to exercise partial frames.
    pub(crate) fn chunked(body: &str, size: usize) -> Vec<Vec<u8>> {
        body.as_bytes().chunks(size).map(<[u8]>::to_vec).collect()
    }

    pub(crate) fn request_bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|req| req.body.as_deref())
            .filter_map(|body| serde_json::from_slice(body).ok())
            .collect()
    }

    fn next(&self, request: HttpRequest) -> Scripted {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left")
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, LLMError> {
        if cancel.is_cancelled() {
            return Err(LLMError::aborted());
        }
        match self.next(request) {
            Scripted::Json(status, body) => Ok(HttpResponse {
                status,
                headers: Default::default(),
                body: body.into_bytes(),
            }),
            Scripted::Stream(..) => panic!("expected a buffered call"),
        }
    }

    async fn send_stream(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpStreamResponse, LLMError> {
        if cancel.is_cancelled() {
            return Err(LLMError::aborted());
        }
        match self.next(request) {
            Scripted::Stream(status, chunks) => Ok(HttpStreamResponse {
                status,
                headers: Default::default(),
                body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
            }),
            Scripted::Json(status, body) => Ok(HttpStreamResponse {
                status,
                headers: Default::default(),
                body: stream::iter([Ok(body.into_bytes())]).boxed(),
            }),
        }
    }
}
