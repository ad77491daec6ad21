use log::debug;
use serde::Deserialize;

pub const DONE_MARKER: &str = "data: [DONE]";
const DATA_PREFIX: &str = "data: ";

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental UTF-8 decoder that carries an incomplete trailing sequence
/// over to the next chunk. Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a dangling partial sequence at end of input.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Extracts the text delta carried by one complete event-stream segment.
///
/// Returns `None` for blank segments, the done marker, payloads that fail to
/// parse, and payloads without a non-empty `choices[0].delta.content`.
pub fn parse_segment(segment: &str) -> Option<String> {
    let segment = segment.strip_suffix('\r').unwrap_or(segment);
    if segment.trim().is_empty() || segment == DONE_MARKER {
        return None;
    }

    let payload = segment.strip_prefix(DATA_PREFIX).unwrap_or(segment);
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty()),
        Err(e) => {
            debug!("Error parsing chunk: {} for segment: {}", e, segment);
            None
        }
    }
}

/// Line-buffered consumer for the relay's streamed completion body.
#[derive(Debug, Default)]
pub struct StreamConsumer {
    decoder: Utf8Decoder,
    buffer: String,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk` and returns the text fragments of every segment it
    /// completed, in order. The trailing partial segment stays buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);

        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let segment: String = self.buffer.drain(..=pos).collect();
            if let Some(fragment) = parse_segment(&segment[..segment.len() - 1]) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    /// Ends the stream. Whatever is still buffered is an unterminated segment
    /// and is dropped.
    pub fn finish(&mut self) {
        let _ = self.decoder.finish();
        if !self.buffer.is_empty() {
            debug!("Discarding unterminated segment of {} bytes", self.buffer.len());
            self.buffer.clear();
        }
    }
}
