//! Server-sent-event decoding shared by every streaming provider.
//!
//! The decoder is framing-only: it knows nothing about vendor payloads. It accepts both
//! event-typed streams (`event:` + `data:`) and data-only streams, and turns the
//! `data: [DONE]` sentinel into [`SseItem::Done`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::de::DeserializeOwned;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::LLMError;
use crate::http::HttpBodyStream;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Value of the `event:` field, absent for data-only streams.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn typed(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Parses the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Items yielded by [`SseDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Event(SseEvent),
    /// The `[DONE]` terminal marker. Nothing follows it.
    Done,
}

#[derive(Default)]
struct Frame {
    event: Option<Vec<u8>>,
    id: Option<Vec<u8>>,
    data_lines: Vec<Vec<u8>>,
}

impl Frame {
    fn is_empty(&self) -> bool {
        self.data_lines.is_empty()
    }
}

/// Incremental SSE decoder over an HTTP body stream.
///
/// One malformed frame produces a single [`LLMError::Decode`] item and decoding resumes
/// at the next frame boundary. A transport error is yielded once and ends the stream.
/// When a cancellation token is attached and fires, the stream ends without an error
/// on the next poll.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    frame: Frame,
    pending: VecDeque<Result<SseItem, LLMError>>,
    provider: &'static str,
    body_closed: bool,
    finished: bool,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl SseDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            frame: Frame::default(),
            pending: VecDeque::new(),
            provider,
            body_closed: false,
            finished: false,
            cancelled: None,
        }
    }

    /// Ends the stream as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if line.first() == Some(&b':') {
            return;
        }
        let (field, value) = match line.iter().position(|b| *b == b':') {
            Some(pos) => {
                let mut value = &line[pos + 1..];
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                (&line[..pos], value.to_vec())
            }
            None => (line.as_slice(), Vec::new()),
        };
        match field {
            b"data" => self.frame.data_lines.push(value),
            b"event" => self.frame.event = Some(value),
            b"id" => self.frame.id = Some(value),
            // retry hints only matter to reconnecting clients
            b"retry" => {}
            other => {
                tracing::trace!(
                    provider = self.provider,
                    field = %String::from_utf8_lossy(other),
                    "ignoring unknown SSE field"
                );
            }
        }
    }

    fn flush_frame(&mut self) {
        let frame = std::mem::take(&mut self.frame);
        if frame.is_empty() {
            return;
        }
        match self.decode_frame(frame) {
            Ok(Some(item)) => self.pending.push_back(Ok(item)),
            Ok(None) => {}
            Err(err) => self.pending.push_back(Err(err)),
        }
    }

    fn decode_frame(&self, frame: Frame) -> Result<Option<SseItem>, LLMError> {
        let text = |bytes: Vec<u8>| {
            String::from_utf8(bytes).map_err(|err| LLMError::Decode {
                provider: self.provider,
                message: format!("invalid UTF-8 in event frame: {err}"),
            })
        };

        let data = text(frame.data_lines.join(&b'\n'))?;
        if data.trim() == "[DONE]" {
            return Ok(Some(SseItem::Done));
        }
        if data.is_empty() && frame.event.is_none() {
            return Ok(None);
        }
        Ok(Some(SseItem::Event(SseEvent {
            event: frame.event.map(text).transpose()?,
            data,
            id: frame.id.map(text).transpose()?,
        })))
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }

    fn next_pending(&mut self) -> Option<Result<SseItem, LLMError>> {
        let item = self.pending.pop_front()?;
        if matches!(item, Ok(SseItem::Done)) {
            self.finished = true;
            self.pending.clear();
        }
        Some(item)
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseItem, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                if !this.finished {
                    tracing::debug!(provider = this.provider, "event stream cancelled");
                }
                this.finished = true;
                return Poll::Ready(None);
            }
        }

        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            if let Some(item) = this.next_pending() {
                return Poll::Ready(Some(item));
            }

            if this.body_closed {
                if !this.buffer.is_empty() {
                    let line = std::mem::take(&mut this.buffer);
                    this.handle_line(line);
                }
                this.flush_frame();
                this.finished = this.pending.is_empty();
                match this.next_pending() {
                    Some(item) => return Poll::Ready(Some(item)),
                    None => {
                        this.finished = true;
                        return Poll::Ready(None);
                    }
                }
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(line) = Self::drain_line(&mut this.buffer) {
                        if line.is_empty() {
                            this.flush_frame();
                        } else {
                            this.handle_line(line);
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => this.body_closed = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;

    fn body(chunks: Vec<Result<Vec<u8>, LLMError>>) -> HttpBodyStream {
        Box::pin(stream::iter(chunks))
    }

    fn bytes(chunks: &[&[u8]]) -> HttpBodyStream {
        body(chunks.iter().map(|c| Ok(c.to_vec())).collect())
    }

    async fn collect(decoder: SseDecoder) -> Vec<Result<SseItem, LLMError>> {
        decoder.collect().await
    }

    #[tokio::test]
    async fn decodes_event_typed_frames() {
        let decoder = SseDecoder::new(
            bytes(&[b"event: message_start\ndata: {\"a\":1}\n\nevent: ping\ndata: {}\n\n"]),
            "test",
        );
        let items = collect(decoder).await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &SseItem::Event(SseEvent::typed("message_start", "{\"a\":1}"))
        );
        assert_eq!(
            items[1].as_ref().unwrap(),
            &SseItem::Event(SseEvent::typed("ping", "{}"))
        );
    }

    #[tokio::test]
    async fn decodes_data_only_frames_and_done() {
        let decoder = SseDecoder::new(
            bytes(&[b"data: {\"x\":1}\r\n\r\n", b"data: [DONE]\n\ndata: {\"late\":1}\n\n"]),
            "test",
        );
        let items = collect(decoder).await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &SseItem::Event(SseEvent::data("{\"x\":1}"))
        );
        assert_eq!(items[1].as_ref().unwrap(), &SseItem::Done);
    }

    #[tokio::test]
    async fn byte_by_byte_delivery_matches_single_chunk() {
        let raw = b": keep-alive\nevent: delta\nid: 7\ndata: line one\ndata: line two\n\n";
        let whole = collect(SseDecoder::new(bytes(&[raw]), "test")).await;
        let split: Vec<&[u8]> = raw.chunks(1).collect();
        let pieces = collect(SseDecoder::new(bytes(&split), "test")).await;

        let expected = SseItem::Event(SseEvent {
            event: Some("delta".to_string()),
            data: "line one\nline two".to_string(),
            id: Some("7".to_string()),
        });
        assert_eq!(whole.len(), 1);
        assert_eq!(pieces.len(), 1);
        assert_eq!(whole[0].as_ref().unwrap(), &expected);
        assert_eq!(pieces[0].as_ref().unwrap(), &expected);
    }

    #[tokio::test]
    async fn invalid_utf8_frame_does_not_halt_the_stream() {
        let decoder = SseDecoder::new(bytes(&[b"data: \xff\n\n", b"data: ok\n\n"]), "test");
        let items = collect(decoder).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0],
            Err(LLMError::Decode {
                provider: "test",
                ..
            })
        ));
        assert_eq!(
            items[1].as_ref().unwrap(),
            &SseItem::Event(SseEvent::data("ok"))
        );
    }

    #[tokio::test]
    async fn trailing_frame_without_blank_line_is_flushed() {
        let items = collect(SseDecoder::new(bytes(&[b"data: tail"]), "test")).await;
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &SseItem::Event(SseEvent::data("tail"))
        );
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let decoder = SseDecoder::new(
            body(vec![
                Ok(b"data: one\n\n".to_vec()),
                Err(LLMError::transport("reset")),
                Ok(b"data: two\n\n".to_vec()),
            ]),
            "test",
        );
        let items = collect(decoder).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(LLMError::Transport { .. })));
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream_without_error() {
        let token = CancellationToken::new();
        let first = stream::iter([Ok(b"data: one\n\n".to_vec())]);
        let body: HttpBodyStream = Box::pin(first.chain(stream::pending()));
        let mut decoder = SseDecoder::new(body, "test").with_cancellation(token.clone());

        let item = decoder.next().await.expect("first event").expect("ok");
        assert_eq!(item, SseItem::Event(SseEvent::data("one")));

        token.cancel();
        assert!(decoder.next().await.is_none());
        assert!(decoder.next().await.is_none());
    }
}
