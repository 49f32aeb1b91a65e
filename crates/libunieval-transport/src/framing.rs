//! Payload framing for HTTP response bodies
//!
//! Two framings are supported:
//! - Server-Sent Events: payload is the `data:` content of each event;
//!   comments and other fields are not payload.
//! - Raw bodies terminated by an in-band end marker: payload is every byte
//!   before the marker.

use bytes::Bytes;

/// In-band end-of-stream marker used by raw streaming bodies
pub const STREAM_COMPLETE_MARKER: &[u8] = b"---STREAM_COMPLETE---";

/// Splits a raw body at an end marker, which may straddle chunk boundaries.
///
/// Bytes that could be the start of the marker are held back until the next
/// chunk resolves them.
#[derive(Debug)]
pub struct MarkerFramer {
    marker: &'static [u8],
    held: Vec<u8>,
    done: bool,
}

impl MarkerFramer {
    pub fn new(marker: &'static [u8]) -> Self {
        Self {
            marker,
            held: Vec::new(),
            done: false,
        }
    }

    /// Feed a body chunk; returns the payload bytes it released
    pub fn push(&mut self, chunk: Bytes) -> Bytes {
        if self.done {
            return Bytes::new();
        }
        if self.held.is_empty() {
            self.scan(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.held);
            joined.extend_from_slice(&chunk);
            self.scan(Bytes::from(joined))
        }
    }

    /// End of body: release anything held back
    pub fn finish(&mut self) -> Bytes {
        if self.done {
            return Bytes::new();
        }
        self.done = true;
        Bytes::from(std::mem::take(&mut self.held))
    }

    /// True once the marker was seen or the body ended
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn scan(&mut self, data: Bytes) -> Bytes {
        if let Some(pos) = find(&data, self.marker) {
            self.done = true;
            self.held.clear();
            return data.slice(..pos);
        }
        let cut = data.len() - partial_suffix(&data, self.marker);
        self.held = data[cut..].to_vec();
        data.slice(..cut)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest suffix of `data` that is a proper prefix of `marker`
fn partial_suffix(data: &[u8], marker: &[u8]) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| data.ends_with(&marker[..k]))
        .unwrap_or(0)
}

/// One dispatched Server-Sent Event, reduced to what the transfer cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A data event and its payload
    Data(Bytes),
    /// The server signalled end of stream
    Done,
    /// An `event: error` frame with its data
    Error(String),
}

/// Incremental `text/event-stream` decoder.
///
/// Lines end with `\n`, `\r\n` or a bare `\r`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Vec<u8>,
    has_data: bool,
    event: Option<String>,
    // Last chunk ended on `\r`; a leading `\n` in the next one belongs to it
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a body chunk; returns the events completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        if self.after_cr && !rest.is_empty() {
            self.after_cr = false;
            if rest[0] == b'\n' {
                rest = &rest[1..];
            }
        }

        while let Some(end) = rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            self.line.extend_from_slice(&rest[..end]);
            let terminator = rest[end];
            rest = &rest[end + 1..];

            if terminator == b'\r' {
                match rest.first() {
                    Some(b'\n') => rest = &rest[1..],
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }

            let line = std::mem::take(&mut self.line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.line.extend_from_slice(rest);

        frames
    }

    /// End of body. An event without its terminating blank line is discarded.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        self.line.clear();
        self.after_cr = false;
        self.reset();
        Vec::new()
    }

    fn process_line(&mut self, line: &[u8]) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line[0] == b':' {
            return None;
        }

        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &b""[..]),
        };

        match field {
            b"data" => {
                if self.has_data {
                    self.data.push(b'\n');
                }
                self.data.extend_from_slice(value);
                self.has_data = true;
            }
            b"event" => {
                self.event = Some(String::from_utf8_lossy(value).into_owned());
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !self.has_data {
            self.reset();
            return None;
        }

        let frame = if self.event.as_deref() == Some("error") {
            SseFrame::Error(String::from_utf8_lossy(&self.data).into_owned())
        } else if self.data == b"[DONE]" || self.data == STREAM_COMPLETE_MARKER {
            SseFrame::Done
        } else {
            SseFrame::Data(Bytes::from(std::mem::take(&mut self.data)))
        };

        self.reset();
        Some(frame)
    }

    fn reset(&mut self) {
        self.data.clear();
        self.has_data = false;
        self.event = None;
    }
}
