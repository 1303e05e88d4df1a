//! Incremental server-sent-events framing.

/// One complete SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Buffers raw stream chunks and yields complete frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut by a chunk boundary.
    carry: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of the response body.
    pub fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        // CRLF pairs may straddle chunks, so normalize the whole buffer.
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    /// Append raw body bytes. Multi-byte characters may span chunks.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), std::str::Utf8Error> {
        self.carry.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.carry) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(e),
        };
        let rest = self.carry.split_off(valid);
        let complete = std::mem::replace(&mut self.carry, rest);
        self.push(std::str::from_utf8(&complete)?);
        Ok(())
    }

    /// Next complete frame, skipping comment-only and empty frames.
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            let end = self.buffer.find("\n\n")?;
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&block) {
                return Some(frame);
            }
        }
    }

    /// Whether unterminated data is still buffered.
    pub fn has_partial(&self) -> bool {
        !self.buffer.trim().is_empty() || !self.carry.is_empty()
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match &mut data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    if event.is_none() && data.is_none() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data.unwrap_or_default(),
    })
}
