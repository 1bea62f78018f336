//! Input framing: auto-detect newline-delimited JSON versus
//! `Content-Length`-prefixed frames, the way an editor's language-server
//! client might speak either depending on its own MCP transport.
//!
//! The read-line idiom is grounded on `moltis-mcp::transport::StdioTransport`'s
//! stdout reader loop (`BufReader` + `read_line` into a reused `String`,
//! skip blank lines); the `Content-Length` variant has no teacher
//! precedent and is modeled on the header-then-body shape spec.md
//! names explicitly.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    NewlineDelimited,
    ContentLength,
}

/// Reads one JSON-RPC frame at a time from a byte stream, detecting the
/// framing style from the first non-whitespace byte of the stream and
/// sticking with it for the rest of the connection.
pub struct FrameReader<R> {
    inner: R,
    framing: Option<Framing>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, framing: None }
    }

    /// Returns the next decoded frame body, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<String>> {
        let framing = match self.framing {
            Some(f) => f,
            None => match self.detect_framing().await? {
                Some(f) => {
                    self.framing = Some(f);
                    f
                },
                None => return Ok(None),
            },
        };

        match framing {
            Framing::NewlineDelimited => self.read_newline_frame().await,
            Framing::ContentLength => self.read_content_length_frame().await,
        }
    }

    async fn detect_framing(&mut self) -> std::io::Result<Option<Framing>> {
        loop {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                return Ok(None);
            }
            if let Some(&b) = buf.iter().find(|b| !b.is_ascii_whitespace()) {
                return Ok(Some(if b == b'{' || b == b'[' {
                    Framing::NewlineDelimited
                } else {
                    Framing::ContentLength
                }));
            }
            let consumed = buf.len();
            self.inner.consume(consumed);
        }
    }

    async fn read_newline_frame(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.inner.read_line(&mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn read_content_length_frame(&mut self) -> std::io::Result<Option<String>> {
        let mut content_length: Option<usize> = None;
        let mut header_line = String::new();
        loop {
            header_line.clear();
            let n = self.inner.read_line(&mut header_line).await?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = header_line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some(value) = trimmed.strip_prefix("Content-Length:") {
                content_length = value.trim().parse().ok();
            }
        }

        let Some(len) = content_length else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "frame headers had no Content-Length",
            ));
        };

        let mut body = vec![0_u8; len];
        tokio::io::AsyncReadExt::read_exact(&mut self.inner, &mut body).await?;
        String::from_utf8(body)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_newline_delimited_json() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".to_vec();
        let mut reader = FrameReader::new(tokio::io::BufReader::new(std::io::Cursor::new(input)));
        let frame = reader.next_frame().await.expect("read").expect("frame");
        assert!(frame.starts_with('{'));
    }

    #[tokio::test]
    async fn detects_content_length_framing() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let input = format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes();
        let mut reader = FrameReader::new(tokio::io::BufReader::new(std::io::Cursor::new(input)));
        let frame = reader.next_frame().await.expect("read").expect("frame");
        assert_eq!(frame, body);
    }

    #[tokio::test]
    async fn reads_multiple_newline_frames_in_sequence() {
        let input = b"{\"id\":1}\n{\"id\":2}\n".to_vec();
        let mut reader = FrameReader::new(tokio::io::BufReader::new(std::io::Cursor::new(input)));
        let first = reader.next_frame().await.expect("read").expect("frame");
        let second = reader.next_frame().await.expect("read").expect("frame");
        assert_eq!(first, r#"{"id":1}"#);
        assert_eq!(second, r#"{"id":2}"#);
    }

    #[tokio::test]
    async fn empty_stream_yields_no_frame() {
        let mut reader = FrameReader::new(tokio::io::BufReader::new(std::io::Cursor::new(Vec::new())));
        assert!(reader.next_frame().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn content_length_frame_missing_header_is_an_error() {
        let input = b"X-Other: 1\r\n\r\nbody".to_vec();
        let mut reader = FrameReader::new(tokio::io::BufReader::new(std::io::Cursor::new(input)));
        assert!(reader.next_frame().await.is_err());
    }
}
