//! Incremental line-buffered protocol decoder.
//!
//! Chunks arrive from a pipe and may split records anywhere, including in
//! the middle of a multi-byte character. The parser buffers raw bytes and
//! only decodes complete lines, so the emitted event sequence is identical
//! however the input is fragmented.

use serde_json::Value;

use crate::protocol::StreamEvent;
use crate::flog_trace;

/// Incremental NDJSON parser for the worker output protocol.
///
/// `write` returns the events completed by that chunk, in stream order.
/// The trailing fragment after the last newline is retained until the next
/// `write` or until `end` flushes it.
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed a chunk of raw bytes, returning any completed events.
    pub fn write(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Feed a text chunk. Convenience for already-decoded input.
    pub fn write_str(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.write(chunk.as_bytes())
    }

    /// Flush the trailing fragment, parsing it exactly as a complete line.
    pub fn end(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest).into_iter().collect()
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode one candidate line.
///
/// Empty lines are dropped. Lines that are not JSON at all are discarded
/// silently; workers interleave incidental text with the protocol stream
/// and that is expected, not an error.
fn parse_line(line: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => StreamEvent::from_record(value),
        Err(_) => {
            flog_trace!("Discarding non-protocol line: {}", trimmed);
            None
        }
    }
}
