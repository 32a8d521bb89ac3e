//! Incremental decoder for the device `text/event-stream` feed.
//!
//! The cloud publishes named events as
//!
//! ```text
//! event: STATUS
//! data: {"data":"BREWING","ttl":60,"published_at":"...","coreid":"..."}
//!
//! ```
//!
//! interleaved with `:ok` comments and bare keep-alive newlines.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use tracing::trace;

use super::error::{DeviceError, DeviceResult};
use super::types::DeviceEvent;

/// Lazy, infinite, non-restartable sequence of device events.
pub type EventSource = Pin<Box<dyn Stream<Item = DeviceResult<DeviceEvent>> + Send>>;

const DEFAULT_EVENT_KIND: &str = "message";

/// Longest line the decoder buffers while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    kind: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns every event completed by it.
    ///
    /// Fails once an unterminated line grows past [`MAX_LINE_BYTES`].
    pub fn feed(&mut self, chunk: &[u8]) -> DeviceResult<Vec<DeviceEvent>> {
        // Buffered bytes never contain a newline, so only the new chunk is scanned.
        let mut scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buf[scan_from..].iter().position(|b| *b == b'\n') {
            let line_end = scan_from + offset;
            let line = String::from_utf8_lossy(&self.buf[line_start..line_end]).into_owned();
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
            line_start = line_end + 1;
            scan_from = line_start;
        }
        self.buf.drain(..line_start);

        if self.buf.len() > MAX_LINE_BYTES {
            let pending = self.buf.len();
            self.buf.clear();
            return Err(DeviceError::Stream(format!(
                "event line exceeds {} bytes ({} pending)",
                MAX_LINE_BYTES, pending
            )));
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Option<DeviceEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            trace!(comment = %line, "Event stream comment");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.kind = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry only matter for reconnection, which is not done here.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<DeviceEvent> {
        let kind = self.kind.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(DeviceEvent {
            kind: kind.unwrap_or_else(|| DEFAULT_EVENT_KIND.to_string()),
            data,
        })
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<DeviceEvent>,
    finished: bool,
}

/// Turns a raw byte stream into an [`EventSource`].
///
/// A transport error or an oversized line is yielded once and ends the
/// sequence; a partially received event at end of stream is discarded.
pub fn decode_stream<S, B, E>(bytes: S) -> EventSource
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.feed(chunk.as_ref()) {
                    Ok(events) => state.pending.extend(events),
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                },
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(DeviceError::Stream(err.to_string())), state));
                }
                None => return None,
            }
        }
    }))
}
