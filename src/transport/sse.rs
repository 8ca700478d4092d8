//! Server-sent events framing
//!
//! Turns a byte stream into `Frame`s. Bytes are buffered until a full line
//! is available, so multi-byte characters split across chunks decode
//! correctly.

use super::TransportError;
use crate::dispatcher::Frame;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;

const DEFAULT_EVENT: &str = "message";

/// Incremental SSE parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame it completed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encoding`] when a completed line is not
    /// valid UTF-8.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, TransportError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = std::str::from_utf8(&line)?;
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// End of input. A trailing event without its blank line is still
    /// dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encoding`] when the unterminated last line
    /// is not valid UTF-8.
    pub fn finish(&mut self) -> Result<Option<Frame>, TransportError> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = std::str::from_utf8(&rest)?;
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(frame) = self.process_line(line) {
                return Ok(Some(frame));
            }
        }
        Ok(self.dispatch())
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry have no meaning for a single-shot stream
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(Frame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
        })
    }
}

/// Decode a byte stream into frames. A transport error is yielded once and
/// ends the stream.
pub fn frames<S>(bytes: S) -> impl Stream<Item = Result<Frame, TransportError>> + Send
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
    let state = (Box::pin(bytes), SseParser::new(), VecDeque::new(), false);

    stream::unfold(state, |(mut bytes, mut parser, mut ready, mut done)| async move {
        loop {
            if let Some(frame) = ready.pop_front() {
                return Some((Ok(frame), (bytes, parser, ready, done)));
            }
            if done {
                return None;
            }

            match bytes.next().await {
                Some(Ok(chunk)) => match parser.feed(&chunk) {
                    Ok(frames) => ready.extend(frames),
                    Err(e) => {
                        done = true;
                        return Some((Err(e), (bytes, parser, ready, done)));
                    }
                },
                Some(Err(e)) => {
                    done = true;
                    return Some((Err(e), (bytes, parser, ready, done)));
                }
                None => {
                    done = true;
                    match parser.finish() {
                        Ok(frame) => ready.extend(frame),
                        Err(e) => return Some((Err(e), (bytes, parser, ready, done))),
                    }
                }
            }
        }
    })
}
