//! Balanced-brace frame codec for the broker/host/client wire protocol.
//!
//! A frame is a single textual JSON record. Framing needs no length prefix
//! and no escaping: the reader tracks brace depth and the frame ends the
//! instant depth returns to zero. This mirrors the original implementation's
//! `SocketReader.read_json`, but reads through a `BufReader` so only the
//! first byte of a frame costs a real syscall; the rest come out of the
//! buffer (see spec.md §9, "One-byte-at-a-time frame reader").

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::messages::Message;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame must begin with '{{', got {0:?}")]
    BadOpenByte(char),
    #[error("connection closed mid-frame")]
    UnexpectedEof,
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads one balanced-brace frame from `reader`. Returns `Ok(None)` on a
/// clean EOF before any byte of a new frame is read, matching the "peer
/// closed the connection" case callers treat as disconnect.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, WireError> {
    let mut first = [0u8; 1];
    let n = reader.read(&mut first).await?;
    if n == 0 {
        return Ok(None);
    }
    if first[0] != b'{' {
        return Err(WireError::BadOpenByte(first[0] as char));
    }

    let mut buf = vec![first[0]];
    let mut depth: i32 = 1;
    let mut byte = [0u8; 1];
    while depth != 0 {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(WireError::UnexpectedEof);
        }
        buf.push(byte[0]);
        match byte[0] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
    }

    Ok(Some(buf))
}

/// Writes `payload` (already-balanced JSON text) as a single frame. The
/// frame is self-delimiting, so no trailing delimiter is written.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads and decodes one [`Message`]. `Ok(None)` means clean EOF.
pub async fn recv_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Message>, WireError> {
    match read_frame(reader).await? {
        None => Ok(None),
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_slice(&raw)?;
            Ok(Some(Message::from_value(value)?))
        }
    }
}

/// Encodes and writes one [`Message`] as a frame.
pub async fn send_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> std::io::Result<()> {
    // Message construction guarantees valid JSON; this cannot fail.
    let payload = message.to_value().to_string();
    write_frame(writer, payload.as_bytes()).await
}

/// Writes raw, unframed text. Used for the broker->client channel, which
/// (outside of `ClientInitResponse` during username negotiation) carries
/// plain human-readable text rather than wire records — see spec.md §6,
/// "Broker → client".
pub async fn write_text<W: AsyncWrite + Unpin>(
    writer: &mut W,
    text: &str,
) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientDescriptor, Message};

    #[tokio::test]
    async fn round_trips_a_nested_frame() {
        let msg = Message::StartDual {
            clients: [
                ClientDescriptor {
                    username: "alice".into(),
                    address: "1.1.1.1:1".into(),
                },
                ClientDescriptor {
                    username: "bob".into(),
                    address: "1.1.1.1:2".into(),
                },
            ],
        };
        let mut buf = Vec::new();
        send_message(&mut buf, &msg).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = recv_message(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn rejects_frame_not_starting_with_brace() {
        let mut cursor = std::io::Cursor::new(b"nope".to_vec());
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::BadOpenByte('n')));
    }

    #[tokio::test]
    async fn empty_stream_is_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn two_frames_back_to_back() {
        let mut buf = Vec::new();
        send_message(&mut buf, &Message::ServerInit).await.unwrap();
        send_message(&mut buf, &Message::ForceTerminate)
            .await
            .unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(
            recv_message(&mut cursor).await.unwrap(),
            Some(Message::ServerInit)
        );
        assert_eq!(
            recv_message(&mut cursor).await.unwrap(),
            Some(Message::ForceTerminate)
        );
        assert_eq!(recv_message(&mut cursor).await.unwrap(), None);
    }
}
