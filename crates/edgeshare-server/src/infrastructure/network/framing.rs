//! Frame-level reading and writing over async byte streams.

use edgeshare_core::{decode_frame, encode_message, Frame, Message, ProtocolVariant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::NetworkError;

const READ_CHUNK: usize = 4096;

/// Buffers a byte stream and yields whole frame payloads.
///
/// [`next_frame`](Self::next_frame) is cancellation safe: bytes read before
/// a cancelled call stay buffered for the next one, so it can sit inside
/// `tokio::time::timeout` or `select!`.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Reads the next frame payload (without its length prefix).
    ///
    /// Returns `Ok(None)` when the peer closes between frames.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Protocol`] for an oversized length prefix,
    /// [`NetworkError::UnexpectedEof`] when the stream ends inside a frame,
    /// and [`NetworkError::Io`] for socket failures.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, NetworkError> {
        loop {
            if let Frame::Complete { payload, consumed } = decode_frame(&self.buf)? {
                let payload = payload.to_vec();
                self.buf.drain(..consumed);
                return Ok(Some(payload));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(NetworkError::UnexpectedEof)
                };
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Number of bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Encodes `message` for `variant` and writes the whole frame.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
    variant: ProtocolVariant,
) -> Result<(), NetworkError> {
    let bytes = encode_message(message, variant)?;
    writer.write_all(&bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use edgeshare_core::{decode_message, ProtocolError};
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn test_frames_split_across_writes_are_reassembled() {
        // Arrange
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server);
        let v = ProtocolVariant::CURRENT;
        let mut bytes = encode_message(&Message::MouseMove { x: 3, y: 4 }, v).unwrap();
        bytes.extend(encode_message(&Message::Leave, v).unwrap());

        // Act: deliver the first frame in two pieces, then the rest
        client.write_all(&bytes[..5]).await.unwrap();
        client.write_all(&bytes[5..]).await.unwrap();
        drop(client);

        // Assert
        let first = reader.next_frame().await.unwrap().unwrap();
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(decode_message(&first, v).unwrap(), Message::MouseMove { x: 3, y: 4 });
        assert_eq!(decode_message(&second, v).unwrap(), Message::Leave);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_an_error() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server);

        client.write_all(&[0, 0, 0, 8, b'D']).await.unwrap();
        drop(client);

        assert!(matches!(
            reader.next_frame().await,
            Err(NetworkError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_fails_before_payload() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server);

        client.write_all(&[0x7f, 0xff, 0xff, 0xff]).await.unwrap();

        assert!(matches!(
            reader.next_frame().await,
            Err(NetworkError::Protocol(ProtocolError::BadFraming { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_read_keeps_partial_frame() {
        // Arrange
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server);
        let bytes = encode_message(&Message::Noop, ProtocolVariant::CURRENT).unwrap();
        client.write_all(&bytes[..3]).await.unwrap();

        // Act: the first read gives up while the frame is incomplete
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), reader.next_frame()).await;
        client.write_all(&bytes[3..]).await.unwrap();

        // Assert
        assert!(timed_out.is_err());
        assert_eq!(reader.buffered(), 3);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"CNOP".to_vec());
    }

    #[tokio::test]
    async fn test_write_message_includes_length_prefix() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server);

        write_message(&mut client, &Message::KeepAlive, ProtocolVariant::CURRENT)
            .await
            .unwrap();

        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"CALV".to_vec());
    }
}
