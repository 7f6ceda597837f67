//! Content-Length message framing over stream sockets.
//!
//! Every request and reply is one frame:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Header parsing is case-insensitive and accepts both CRLF and LF line
//! endings. The body is opaque: any byte sequence, including an empty one,
//! travels unchanged.

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a single frame body (100 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Read one framed message from the stream.
///
/// # Errors
///
/// Returns an error if:
/// - The stream is closed (EOF) before a complete header block
/// - No Content-Length header is found
/// - Content-Length exceeds `max_size`
/// - The body cannot be read completely
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_until(b'\n', &mut line)
            .await
            .context("Failed to read header line")?;

        if bytes_read == 0 {
            return Err(anyhow!("Connection closed by remote"));
        }

        let text = std::str::from_utf8(&line).context("Header line is not valid UTF-8")?;
        let trimmed = text.trim();

        if trimmed.is_empty() {
            break;
        }

        if let Some((key, value)) = trimmed.split_once(':') {
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                content_length = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid Content-Length value: {}", value))?,
                );
            }
        }
    }

    let size = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;

    if size > max_size {
        return Err(anyhow!(
            "Message size {} exceeds maximum {} bytes",
            size,
            max_size
        ));
    }

    let mut body = vec![0u8; size];
    reader
        .read_exact(&mut body)
        .await
        .context("Failed to read message body")?;

    Ok(body)
}

/// Write one framed message and flush it.
///
/// Header and body go out in a single buffer so a frame is never observed
/// half-written by the remote unless the connection itself fails.
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body);

    writer
        .write_all(&frame)
        .await
        .context("Failed to write message")?;

    writer.flush().await.context("Failed to flush message")?;

    Ok(())
}
