//! Incremental Server-Sent Events decoding for vendor streams.
//!
//! Vendor byte streams arrive in arbitrary slices: an event may span several
//! network chunks and one chunk may carry several events. [`SseDecoder`]
//! buffers partial lines and yields the `data` payload of every complete event.

use bytes::{Buf, BytesMut};

/// Payload marking the end of an OpenAI-style stream.
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the payloads of events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }

        events
    }

    /// Flush an event left open when the stream ended without a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = String::from_utf8_lossy(&rest);
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        // Comments (keep-alives) and other fields are ignored
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data_lines.is_empty() {
            events.push(self.data_lines.join("\n"));
            self.data_lines.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(events, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_multiple_events_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\r\n\r\n: keep-alive\n\ndata: two\n\ndata: [DONE]\n\n");
        assert_eq!(events, vec!["one", "two", DONE_MARKER]);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }
}
