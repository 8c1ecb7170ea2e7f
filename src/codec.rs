//! JSON-RPC framing codec for LSP communication.
//!
//! LSP frames messages as `Content-Length: N\r\n\r\n{json}` over
//! stdin/stdout. This module provides [`FrameReader`] and [`FrameWriter`]
//! for async reading and writing of framed messages.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

enum HeaderBlock {
    ContentLength(usize),
    /// Header block with no usable `Content-Length`; the body length is
    /// unknown, so scanning resumes right after the blank line.
    Malformed,
    Eof,
}

/// Reads JSON-RPC frames from an async reader.
///
/// Parses `Content-Length` headers and reads exactly that many bytes,
/// then deserializes the body as JSON. Malformed input is logged and
/// skipped rather than surfaced: the wire is shared by all callers, so no
/// single request can be blamed for a bad frame.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next well-formed JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on EOF (clean shutdown). Header blocks without a
    /// parseable `Content-Length`, oversized frames, and bodies that are
    /// not valid JSON are skipped. `Err` is reserved for I/O failures,
    /// including EOF in the middle of a frame.
    pub async fn read_frame(&mut self) -> std::io::Result<Option<serde_json::Value>> {
        loop {
            let content_length = match self.read_headers().await? {
                HeaderBlock::ContentLength(len) => len,
                HeaderBlock::Malformed => continue,
                HeaderBlock::Eof => return Ok(None),
            };

            if content_length > MAX_FRAME_BYTES {
                tracing::warn!(
                    content_length,
                    "skipping LSP frame over the {MAX_FRAME_BYTES} byte limit"
                );
                self.discard_body(content_length).await?;
                continue;
            }

            let mut body = vec![0u8; content_length];
            self.reader.read_exact(&mut body).await?;

            match serde_json::from_slice(&body) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    tracing::warn!("dropping unparseable LSP frame: {e}");
                }
            }
        }
    }

    /// Parse header lines until the empty separator line.
    async fn read_headers(&mut self) -> std::io::Result<HeaderBlock> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF is clean only between frames, not inside a header
                // block (e.g. after reading only Content-Type).
                if !saw_any_header_bytes {
                    return Ok(HeaderBlock::Eof);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "EOF while reading LSP headers",
                ));
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Empty line = end of headers
                break;
            }

            // The spec writes "Content-Length"; parse case-insensitively
            // for robustness.
            if let Some(colon_pos) = trimmed.find(':') {
                let key = &trimmed[..colon_pos];
                if key.eq_ignore_ascii_case("Content-Length") {
                    match trimmed[colon_pos + 1..].trim().parse() {
                        Ok(len) => content_length = Some(len),
                        Err(_) => {
                            tracing::warn!(header = %trimmed, "invalid Content-Length value");
                        }
                    }
                }
            }
            // Ignore other headers (e.g. Content-Type)
        }

        match content_length {
            Some(len) => Ok(HeaderBlock::ContentLength(len)),
            None => {
                tracing::warn!("discarding LSP header block without Content-Length");
                Ok(HeaderBlock::Malformed)
            }
        }
    }

    /// Consume and drop exactly `len` body bytes.
    async fn discard_body(&mut self, len: usize) -> std::io::Result<()> {
        let mut sink = tokio::io::sink();
        let copied = tokio::io::copy(&mut (&mut self.reader).take(len as u64), &mut sink).await?;
        if copied < len as u64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "EOF while discarding LSP frame body",
            ));
        }
        Ok(())
    }
}

/// Writes JSON-RPC frames to an async writer.
///
/// Serializes JSON and prepends the `Content-Length` header.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> std::io::Result<()> {
        let body = msg.to_string();
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    /// Yields at most `chunk` bytes per read, to exercise messages that
    /// span multiple reads.
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkedReader {
        fn new(data: Vec<u8>, chunk: usize) -> Self {
            Self {
                data,
                pos: 0,
                chunk,
            }
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let this = self.get_mut();
            if this.pos >= this.data.len() {
                return Poll::Ready(Ok(()));
            }
            let end = this
                .data
                .len()
                .min(this.pos + this.chunk)
                .min(this.pos + buf.remaining());
            buf.put_slice(&this.data[this.pos..end]);
            this.pos = end;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": "file:///test.py" }
        });

        // Write
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        writer.write_frame(&msg).await.unwrap();

        // Read back
        let mut reader = FrameReader::new(buf.as_slice());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result, msg);
    }

    #[tokio::test]
    async fn test_multiple_frames() {
        let msg1 = serde_json::json!({"jsonrpc": "2.0", "id": 1});
        let msg2 = serde_json::json!({"jsonrpc": "2.0", "id": 2});

        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        writer.write_frame(&msg1).await.unwrap();
        writer.write_frame(&msg2).await.unwrap();

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg1);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg2);
    }

    #[tokio::test]
    async fn test_message_spanning_many_reads() {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 42,
            "result": { "items": [{"label": "alpha"}, {"label": "beta"}] }
        });
        let mut buf = Vec::new();
        FrameWriter::new(&mut buf).write_frame(&msg).await.unwrap();

        // 3-byte chunks split both the header and the body mid-token.
        let mut reader = FrameReader::new(ChunkedReader::new(buf, 3));
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_pipelined_frames_chunked() {
        let msg1 = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": null});
        let msg2 = serde_json::json!({"jsonrpc": "2.0", "method": "m", "params": {}});
        let mut buf = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buf);
            writer.write_frame(&msg1).await.unwrap();
            writer.write_frame(&msg2).await.unwrap();
        }

        let mut reader = FrameReader::new(ChunkedReader::new(buf, 7));
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg1);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg2);
    }

    #[tokio::test]
    async fn test_eof_returns_none() {
        let buf: &[u8] = b"";
        let mut reader = FrameReader::new(buf);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_content_length_skips_to_next_frame() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let frame = format!(
            "Content-Type: application/json\r\n\r\nContent-Length: {}\r\n\r\n{body}",
            body.len(),
        );

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 1);
    }

    #[tokio::test]
    async fn test_invalid_content_length_value_skipped() {
        let body = r#"{"jsonrpc":"2.0","id":3}"#;
        let frame = format!(
            "Content-Length: not_a_number\r\n\r\nContent-Length: {}\r\n\r\n{body}",
            body.len(),
        );

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 3);
    }

    #[tokio::test]
    async fn test_invalid_json_body_skipped() {
        let garbage = b"not valid json!!!";
        let body = r#"{"jsonrpc":"2.0","id":9}"#;
        let mut buf = format!("Content-Length: {}\r\n\r\n", garbage.len()).into_bytes();
        buf.extend_from_slice(garbage);
        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n{body}", body.len()).as_bytes());

        let mut reader = FrameReader::new(buf.as_slice());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 9);
    }

    #[tokio::test]
    async fn test_oversized_frame_skipped() {
        let oversized_len = MAX_FRAME_BYTES + 1;
        let mut buf = format!("Content-Length: {oversized_len}\r\n\r\n").into_bytes();
        buf.extend_from_slice(&vec![b'x'; oversized_len]);
        let body = r#"{"jsonrpc":"2.0","id":2}"#;
        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n{body}", body.len()).as_bytes());

        let mut reader = FrameReader::new(buf.as_slice());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 2);
    }

    #[tokio::test]
    async fn test_eof_mid_headers_is_error() {
        // EOF after reading a header line must not be treated as a clean
        // shutdown.
        let buf: &[u8] = b"Content-Length: 10\r\n";
        let mut reader = FrameReader::new(buf);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_eof_mid_body_is_error() {
        // Content-Length says 100, but only 5 bytes follow
        let buf: &[u8] = b"Content-Length: 100\r\n\r\nhello";
        let mut reader = FrameReader::new(buf);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_case_insensitive_content_length() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let frame = format!("content-length: {}\r\n\r\n{body}", body.len());

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 1);
    }

    #[tokio::test]
    async fn test_ignores_extra_headers() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let frame = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
            body.len(),
        );

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 1);
    }

    #[tokio::test]
    async fn test_multibyte_utf8_content_length_counts_bytes() {
        // Content-Length counts bytes, not characters.
        // "é" is 2 bytes in UTF-8, so {"k":"é"} is 10 bytes.
        let body = r#"{"k":"é"}"#;
        assert_eq!(body.len(), 10);
        let frame = format!("Content-Length: {}\r\n\r\n{body}", body.len());

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["k"], "é");
    }

    #[tokio::test]
    async fn test_write_content_length_is_byte_count() {
        let msg = serde_json::json!({"k": "é"});
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        writer.write_frame(&msg).await.unwrap();

        let output = String::from_utf8(buf).unwrap();
        let body = msg.to_string();
        assert!(output.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
    }
}
