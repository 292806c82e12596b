//! The public streaming protocol.
//!
//! Execution events are translated 1:1 into [`StreamEvent`]s and written as
//! SSE text frames:
//!
//! ```text
//! data: {"type":"connected"}
//!
//! data: {"type":"token","token":"Hel"}
//!
//! data: {"type":"done"}
//!
//! data: [DONE]
//!
//! ```
//!
//! `connected` is always the first frame and the `[DONE]` terminator the
//! last; [`FrameEncoder`] enforces both.  A cancelled run is the exception:
//! its stream stops where it was cut, without `done`.  [`FrameDecoder`] is
//! the client side.

use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::graph::events::GraphEvent;
use crate::graph::executor::GraphRun;

/// Prefix of every frame.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Separator after every frame.
pub const SSE_FRAME_DELIMITER: &str = "\n\n";

/// Payload of the terminator frame.
pub const SSE_DONE_MESSAGE: &str = "[DONE]";

/// The literal terminator frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Used when an event cannot be serialized.
const ENCODE_FAILURE_FRAME: &str = "data: {\"type\":\"error\",\"error\":\"failed to encode event\"}\n\n";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One event of the public protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The stream is open.
    Connected,

    /// An incremental chunk of assistant text.
    Token { token: String },

    /// A tool call started.
    ToolStart { tool: String, input: Value },

    /// A tool call ended; failures carry the error text as output.
    ToolEnd { tool: String, output: Value },

    /// The run failed.
    Error { error: String },

    /// The run ended.
    Done,
}

impl From<GraphEvent> for StreamEvent {
    fn from(event: GraphEvent) -> Self {
        match event {
            GraphEvent::Started { .. } => Self::Connected,
            GraphEvent::Token { text } => Self::Token { token: text },
            GraphEvent::ToolStarted { tool, input, .. } => Self::ToolStart { tool, input },
            GraphEvent::ToolFinished { tool, output, .. } => Self::ToolEnd { tool, output },
            GraphEvent::Failed { message } => Self::Error { error: message },
            GraphEvent::Finished => Self::Done,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize one event as a frame.
pub fn encode_frame(event: &StreamEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("{SSE_DATA_PREFIX}{json}{SSE_FRAME_DELIMITER}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize stream event");
            ENCODE_FAILURE_FRAME.to_owned()
        }
    }
}

/// Stateful encoder enforcing frame order.
///
/// - `connected` is emitted before anything else, exactly once.
/// - `done` is followed by the terminator and then nothing.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    connected: bool,
    finished: bool,
}

impl FrameEncoder {
    /// Create an encoder for a fresh stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminator has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frames to write for `event`, possibly none.
    pub fn encode(&mut self, event: StreamEvent) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(3);
        if !self.connected {
            self.connected = true;
            frames.push(encode_frame(&StreamEvent::Connected));
        }

        match event {
            StreamEvent::Connected => {}
            StreamEvent::Done => {
                self.finished = true;
                frames.push(encode_frame(&StreamEvent::Done));
                frames.push(DONE_FRAME.to_owned());
            }
            other => frames.push(encode_frame(&other)),
        }
        frames
    }

    /// Close the stream if the event source ended without `done`.
    pub fn finish(&mut self) -> Vec<String> {
        self.encode(StreamEvent::Done)
    }
}

/// Turn a run's events into protocol frames.
///
/// See [`encode_events`]; cancelling the run ends the frames immediately.
pub fn sse_frames(run: GraphRun) -> impl Stream<Item = String> + Send + 'static {
    let cancel = run.cancel_token();
    encode_events(run, cancel)
}

/// Turn execution events into protocol frames.
///
/// The result starts with `connected` and ends with the terminator, even if
/// `events` ends early.  Once `cancel` fires no further frames are written,
/// the closing `done` included.
pub fn encode_events<S>(
    events: S,
    cancel: CancellationToken,
) -> impl Stream<Item = String> + Send + 'static
where
    S: Stream<Item = GraphEvent> + Send + 'static,
{
    events
        .map(Some)
        .chain(stream::once(async { None }))
        .scan(FrameEncoder::new(), move |encoder, event| {
            if cancel.is_cancelled() {
                return futures::future::ready(None);
            }
            let frames = match event {
                Some(event) => encoder.encode(event.into()),
                None => encoder.finish(),
            };
            futures::future::ready(Some(stream::iter(frames)))
        })
        .flatten()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A protocol event.
    Event(StreamEvent),
    /// The `[DONE]` terminator.
    Terminator,
}

/// Incremental parser for a frame stream.
///
/// Accepts arbitrary byte chunks; lines are parsed once complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl FrameDecoder {
    /// Create a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminator has been seen.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed a chunk of the response body and return the frames it completed.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProtocolError`] on malformed frames or frames
    /// after the terminator.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.parse_line(&line)? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Parse one line.
    ///
    /// Returns `None` for blank lines, comments, and non-`data` fields.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProtocolError`] on malformed frames or frames
    /// after the terminator.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<Frame>> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let Some(data) = line.strip_prefix("data:") else {
            tracing::trace!(line, "ignoring non-data SSE line");
            return Ok(None);
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        if self.terminated {
            return Err(AgentError::ProtocolError {
                reason: format!("frame after terminator: {data}"),
            });
        }

        if data == SSE_DONE_MESSAGE {
            self.terminated = true;
            return Ok(Some(Frame::Terminator));
        }

        serde_json::from_str(data)
            .map(|event| Some(Frame::Event(event)))
            .map_err(|e| AgentError::ProtocolError {
                reason: format!("invalid event JSON: {e}"),
            })
    }
}

/// Decode a complete response body.
///
/// # Errors
///
/// See [`FrameDecoder::feed`].
pub fn decode_frames(body: &str) -> Result<Vec<Frame>> {
    FrameDecoder::new().feed(body.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frames_use_type_tags() {
        assert_eq!(
            encode_frame(&StreamEvent::Connected),
            "data: {\"type\":\"connected\"}\n\n"
        );
        assert_eq!(
            encode_frame(&StreamEvent::Token { token: "hi".into() }),
            "data: {\"type\":\"token\",\"token\":\"hi\"}\n\n"
        );
        let start = encode_frame(&StreamEvent::ToolStart {
            tool: "lookup".into(),
            input: json!({"x": 1}),
        });
        assert_eq!(
            start,
            "data: {\"type\":\"tool_start\",\"tool\":\"lookup\",\"input\":{\"x\":1}}\n\n"
        );
    }

    #[test]
    fn graph_events_translate_one_to_one() {
        let event = StreamEvent::from(GraphEvent::ToolFinished {
            call_id: "c1".into(),
            tool: "lookup".into(),
            output: json!("42"),
            is_error: false,
        });
        assert_eq!(
            event,
            StreamEvent::ToolEnd {
                tool: "lookup".into(),
                output: json!("42")
            }
        );
        assert_eq!(
            StreamEvent::from(GraphEvent::Failed { message: "x".into() }),
            StreamEvent::Error { error: "x".into() }
        );
    }

    #[test]
    fn encoder_injects_connected_and_stops_after_done() {
        let mut encoder = FrameEncoder::new();
        let first = encoder.encode(StreamEvent::Token { token: "a".into() });
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("connected"));

        assert!(encoder.encode(StreamEvent::Connected).is_empty());

        let last = encoder.encode(StreamEvent::Done);
        assert_eq!(last, vec![encode_frame(&StreamEvent::Done), DONE_FRAME.to_owned()]);
        assert!(encoder.is_finished());
        assert!(encoder.encode(StreamEvent::Token { token: "late".into() }).is_empty());
        assert!(encoder.finish().is_empty());
    }

    #[tokio::test]
    async fn truncated_event_stream_is_still_closed() {
        let events = stream::iter(vec![GraphEvent::Token { text: "partial".into() }]);
        let frames: Vec<String> = encode_events(events, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.last().map(String::as_str), Some(DONE_FRAME));
    }

    #[tokio::test]
    async fn cancelled_event_stream_is_left_open() {
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let frames = encode_events(tokio_stream::wrappers::ReceiverStream::new(rx), cancel.clone());
        let mut frames = Box::pin(frames);

        tx.send(GraphEvent::Started { thread_id: "t".into() }).await.unwrap();
        assert_eq!(frames.next().await, Some(encode_frame(&StreamEvent::Connected)));

        cancel.cancel();
        tx.send(GraphEvent::Token { text: "late".into() }).await.unwrap();
        drop(tx);
        assert_eq!(frames.next().await, None);
    }

    #[test]
    fn decoder_handles_split_chunks() {
        let body = [
            encode_frame(&StreamEvent::Connected),
            encode_frame(&StreamEvent::Token { token: "héllo".into() }),
            encode_frame(&StreamEvent::Done),
            DONE_FRAME.to_owned(),
        ]
        .concat();

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in body.as_bytes().chunks(5) {
            frames.extend(decoder.feed(chunk).unwrap());
        }

        assert_eq!(
            frames,
            vec![
                Frame::Event(StreamEvent::Connected),
                Frame::Event(StreamEvent::Token { token: "héllo".into() }),
                Frame::Event(StreamEvent::Done),
                Frame::Terminator,
            ]
        );
        assert!(decoder.is_terminated());
    }

    #[test]
    fn decoder_rejects_frames_after_terminator() {
        let body = format!("{DONE_FRAME}{}", encode_frame(&StreamEvent::Done));
        assert!(matches!(
            decode_frames(&body),
            Err(AgentError::ProtocolError { .. })
        ));
    }

    #[test]
    fn decoder_ignores_comments_and_rejects_bad_json() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.parse_line(": keepalive").unwrap().is_none());
        assert!(decoder.parse_line("event: message").unwrap().is_none());
        assert!(decoder.parse_line("data: {not json").is_err());
        assert!(decoder.parse_line("data: {\"type\":\"bogus\"}").is_err());
    }
}
