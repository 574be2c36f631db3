//! Server-Sent Events parser for provider streams.
//!
//! OpenAI-compatible backends stream completions as SSE over HTTP. This
//! parser turns a chunked byte stream into the raw `data:` payload strings,
//! handling line buffering across chunk boundaries, `\r\n` endings, comment
//! lines, and the terminal `[DONE]` marker. Payloads are returned as-is for
//! adapter-specific JSON parsing.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

/// Parse SSE lines from a byte stream, yielding `data:` payloads.
///
/// Any buffered trailing line is processed when the stream ends, so a
/// backend that omits the final newline still delivers its last event.
pub fn parse_sse_lines<S>(byte_stream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(SseLineReader::new(byte_stream), |mut reader| async move {
        reader.next_payload().await.map(|payload| (payload, reader))
    })
}

/// Incremental line reader over a chunked byte stream.
struct SseLineReader<S> {
    inner: S,
    buffer: BytesMut,
    eof: bool,
}

impl<S> SseLineReader<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin,
{
    fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(8192),
            eof: false,
        }
    }

    /// Next `data:` payload, pulling more chunks as needed.
    async fn next_payload(&mut self) -> Option<String> {
        loop {
            while let Some(line) = self.take_line() {
                if let Some(payload) = extract_sse_data(&line) {
                    return Some(payload);
                }
            }
            if self.eof {
                return self.drain_trailing();
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    warn!(error = %e, "SSE stream read error");
                    return None;
                }
                None => self.eof = true,
            }
        }
    }

    /// Pop one complete line off the buffer, without its line ending.
    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw = self.buffer.split_to(end + 1);
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    /// A final line the backend never terminated still carries its event.
    fn drain_trailing(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = self.buffer.split();
        let line = String::from_utf8_lossy(&raw);
        extract_sse_data(line.trim())
    }
}

/// Extract the payload from one SSE line.
///
/// Returns `None` for comments, empty lines, non-data fields, and the
/// `[DONE]` marker.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
