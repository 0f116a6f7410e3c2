//! SSE (Server-Sent Events) stream processing utilities
//!
//! Handles parsing of SSE streams from the completion endpoint

use bytes::Bytes;
use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::streaming::{FinishReason, StreamPart};

/// Common SSE stream processor that handles partial lines across chunks
pub struct SseStreamProcessor {
    /// Accumulated partial line from previous chunks
    partial_line: String,
    /// Trailing bytes of a UTF-8 sequence split across chunks
    pending_bytes: Vec<u8>,
    /// Channel to send processed stream parts
    tx: mpsc::UnboundedSender<StreamPart>,
    /// When the stream started
    stream_start: Instant,
    /// Event counter for logging
    event_count: usize,
    /// Bytes received counter
    bytes_received: usize,
    /// Characters of text delivered
    chars_delivered: usize,
    /// Finish already forwarded (providers send both finish_reason and [DONE])
    finished: bool,
    /// Terminal error already forwarded
    failed: bool,
}

impl SseStreamProcessor {
    /// Create a new SSE stream processor
    pub fn new(tx: mpsc::UnboundedSender<StreamPart>) -> Self {
        debug!("SSE stream processor created");
        Self {
            partial_line: String::new(),
            pending_bytes: Vec::new(),
            tx,
            stream_start: Instant::now(),
            event_count: 0,
            bytes_received: 0,
            chars_delivered: 0,
            finished: false,
            failed: false,
        }
    }

    /// Whether the consumer has dropped the receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether a terminal error has been sent
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Whether the upstream signalled completion
    pub fn has_finished(&self) -> bool {
        self.finished
    }

    /// Process a chunk of bytes from the SSE stream
    ///
    /// Returns `Err` with the error detail once the stream carried an error
    /// event; the terminal `StreamPart::Error` has already been sent then.
    pub fn process_chunk<P: SseParser>(&mut self, bytes: Bytes, parser: &P) -> Result<(), String> {
        self.bytes_received += bytes.len();

        // Hold back an incomplete multi-byte character until the next chunk
        let mut buf = std::mem::take(&mut self.pending_bytes);
        buf.extend_from_slice(&bytes);
        let valid_up_to = match std::str::from_utf8(&buf) {
            Ok(_) => buf.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => buf.len(),
        };
        self.pending_bytes = buf.split_off(valid_up_to);
        let text = String::from_utf8_lossy(&buf);

        // Combine with any partial line from previous chunk
        let combined = if self.partial_line.is_empty() {
            text.into_owned()
        } else {
            let mut combined = std::mem::take(&mut self.partial_line);
            combined.push_str(&text);
            combined
        };

        debug!(
            "SSE chunk received: {} bytes (total: {} bytes)",
            bytes.len(),
            self.bytes_received
        );

        let has_trailing_newline = combined.ends_with('\n');
        let mut lines_iter = combined.lines().peekable();

        while let Some(line) = lines_iter.next() {
            // If this is the last line and there's no trailing newline, it's partial
            if lines_iter.peek().is_none() && !has_trailing_newline {
                self.partial_line = line.to_string();
                break;
            }
            self.process_line(line, parser)?;
        }

        Ok(())
    }

    fn process_line<P: SseParser>(&mut self, line: &str, parser: &P) -> Result<(), String> {
        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }

        match line.strip_prefix("data:") {
            Some(data) => self.process_sse_data(data.trim_start(), parser),
            None => Ok(()),
        }
    }

    /// Process SSE data using the provider-specific parser
    pub fn process_sse_data<P: SseParser>(&mut self, data: &str, parser: &P) -> Result<(), String> {
        self.event_count += 1;
        let elapsed = self.stream_start.elapsed();

        // Handle end-of-stream marker
        if data == "[DONE]" {
            info!(
                "SSE stream [DONE] marker received after {:?}, {} events, {} bytes",
                elapsed, self.event_count, self.bytes_received
            );
            self.send_finish(FinishReason::Stop);
            return Ok(());
        }

        if data.trim().is_empty() {
            return Ok(());
        }

        let json = match serde_json::from_str::<Value>(data) {
            Ok(json) => json,
            Err(_) => {
                warn!(
                    "Failed to parse SSE JSON (event #{}): {}",
                    self.event_count, data
                );
                return Ok(());
            }
        };

        // A final chunk may carry both text and a finish reason
        for event in parser.parse_event(&json) {
            match event {
                SseEvent::TextDelta(text) => {
                    if !text.is_empty() {
                        debug!("  -> TextDelta: {} chars", text.len());
                        self.chars_delivered += text.chars().count();
                        let _ = self.tx.send(StreamPart::TextDelta { delta: text });
                    }
                }
                SseEvent::Finish { reason } => {
                    info!(
                        "SSE Finish: reason={} at {:?} ({} events, {} bytes)",
                        reason, elapsed, self.event_count, self.bytes_received
                    );
                    self.send_finish(reason);
                }
                SseEvent::Error(detail) => {
                    warn!("SSE error event at {:?}: {}", elapsed, detail);
                    self.fail(detail.clone());
                    return Err(detail);
                }
            }
        }

        Ok(())
    }

    fn send_finish(&mut self, reason: FinishReason) {
        if !self.finished {
            self.finished = true;
            let _ = self.tx.send(StreamPart::Finish { reason });
        }
    }

    /// Send the terminal error element. Nothing is sent after it.
    pub fn fail(&mut self, detail: String) {
        if !self.failed {
            self.failed = true;
            let _ = self.tx.send(StreamPart::Error { detail });
        }
    }

    /// Finish processing, flushing a trailing line that had no newline.
    ///
    /// A stream that ends without a finish signal or an error was cut short;
    /// it gets a terminal error so partial text is never taken as complete.
    pub fn finish<P: SseParser>(&mut self, parser: &P) {
        if !self.failed && !self.partial_line.is_empty() {
            let line = std::mem::take(&mut self.partial_line);
            let _ = self.process_line(&line, parser);
        }

        if !self.finished && !self.failed {
            warn!(
                "SSE stream ended without a finish signal after {} events",
                self.event_count
            );
            self.fail("stream ended before completion".to_string());
        }

        info!(
            "SSE stream processor finishing: {:?} elapsed, {} events, {} bytes, {} chars",
            self.stream_start.elapsed(),
            self.event_count,
            self.bytes_received,
            self.chars_delivered
        );
    }
}

/// Events that can be parsed from SSE data
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    TextDelta(String),
    Finish { reason: FinishReason },
    Error(String),
}

/// Trait for provider-specific SSE parsing logic
pub trait SseParser: Send + Sync {
    /// Parse a JSON event into the SSE events it carries, in order
    fn parse_event(&self, json: &Value) -> Vec<SseEvent>;
}

/// Common helper to parse finish reasons
pub fn parse_finish_reason(reason_str: &str) -> FinishReason {
    match reason_str {
        "stop" | "end_turn" => FinishReason::Stop,
        "length" | "max_tokens" => FinishReason::Length,
        _ => FinishReason::Other(reason_str.to_string()),
    }
}
