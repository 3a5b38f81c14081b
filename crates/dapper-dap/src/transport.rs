//! Content-Length message framing over an opaque byte stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DapError;

/// Largest message body accepted from an adapter (64 MiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Largest single header line accepted from an adapter.
pub const MAX_HEADER_LINE: u64 = 8 * 1024;

/// Body buffer preallocation cap; larger bodies grow as they arrive.
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

/// Encode a JSON value into a wire-format message with Content-Length header.
pub fn encode_message(value: &serde_json::Value) -> Vec<u8> {
    let body = serde_json::to_string(value).unwrap_or_default();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Read the next framed message from `reader`.
///
/// Returns `Ok(None)` on a clean end of stream between messages. A body
/// that is not valid JSON yields `InvalidResponse`; the stream stays
/// aligned on the next frame, so callers may keep reading. Header lines
/// longer than [`MAX_HEADER_LINE`] and bodies larger than
/// [`MAX_MESSAGE_SIZE`] are `Transport` errors and nothing is allocated for
/// them.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<serde_json::Value>, DapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    loop {
        let mut line = String::new();
        let n = (&mut *reader)
            .take(MAX_HEADER_LINE)
            .read_line(&mut line)
            .await
            .map_err(|e| DapError::Transport(e.to_string()))?;
        if n == 0 {
            if saw_header {
                return Err(DapError::Transport("stream closed inside header".into()));
            }
            return Ok(None);
        }
        if !line.ends_with('\n') && n as u64 == MAX_HEADER_LINE {
            return Err(DapError::Transport(format!(
                "header line exceeds {MAX_HEADER_LINE} bytes"
            )));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(parse_content_length(value.trim())?);
        }
    }

    let length =
        content_length.ok_or_else(|| DapError::Transport("missing Content-Length header".into()))?;
    let mut body = Vec::with_capacity(length.min(INITIAL_BODY_CAPACITY));
    (&mut *reader)
        .take(length as u64)
        .read_to_end(&mut body)
        .await
        .map_err(|e| DapError::Transport(format!("stream closed inside body: {e}")))?;
    if body.len() < length {
        return Err(DapError::Transport(format!(
            "stream closed inside body: expected {length} bytes, got {}",
            body.len()
        )));
    }

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| DapError::InvalidResponse(format!("JSON parse error: {e}")))
}

/// Frame and write one message, flushing afterwards.
pub async fn write_message<W>(writer: &mut W, value: &serde_json::Value) -> Result<(), DapError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(value);
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| DapError::Transport(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| DapError::Transport(e.to_string()))
}

fn parse_content_length(value: &str) -> Result<usize, DapError> {
    let length: usize = value.parse().map_err(|e| {
        DapError::Transport(format!("invalid Content-Length value '{value}': {e}"))
    })?;
    if length > MAX_MESSAGE_SIZE {
        return Err(DapError::Transport(format!(
            "Content-Length {length} exceeds limit of {MAX_MESSAGE_SIZE} bytes"
        )));
    }
    Ok(length)
}
