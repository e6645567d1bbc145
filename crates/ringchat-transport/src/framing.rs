//! Length-prefixed framing.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ length: 6 bytes (BE) │ body: `length` bytes     │
//! └──────────────────────┴──────────────────────────┘
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Size of the big-endian length header.
pub const HEADER_SIZE: usize = 6;

/// Largest body accepted in either direction (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Writes one frame and flushes.
///
/// # Errors
/// - [`TransportError::Framing`] if `body` exceeds [`MAX_FRAME_LEN`]
/// - [`TransportError::SendFailed`] on I/O failure
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::Framing(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            body.len()
        )));
    }

    let len = (body.len() as u64).to_be_bytes();
    let header = &len[len.len() - HEADER_SIZE..];

    writer
        .write_all(header)
        .await
        .map_err(TransportError::SendFailed)?;
    writer
        .write_all(body)
        .await
        .map_err(TransportError::SendFailed)?;
    writer.flush().await.map_err(TransportError::SendFailed)
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between
/// frames. A stream that ends inside a header or body is a
/// [`TransportError::Framing`] error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader
            .read(&mut header[filled..])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::Framing(format!(
                "stream ended after {filled} of {HEADER_SIZE} header bytes"
            )));
        }
        filled += n;
    }

    let mut len_bytes = [0u8; 8];
    len_bytes[8 - HEADER_SIZE..].copy_from_slice(&header);
    let len = u64::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN as u64 {
        return Err(TransportError::Framing(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }

    let mut body = vec![0u8; len as usize];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            TransportError::Framing(format!("stream ended inside a {len}-byte body")),
        ),
        Err(e) => Err(TransportError::ReceiveFailed(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_frame_header_is_six_byte_big_endian() {
        let mut out = Vec::new();
        write_frame(&mut out, b"hello").await.unwrap();
        assert_eq!(&out[..HEADER_SIZE], &[0, 0, 0, 0, 0, 5]);
        assert_eq!(&out[HEADER_SIZE..], b"hello");
    }

    #[tokio::test]
    async fn test_read_frame_reads_back_consecutive_frames() {
        let mut out = Vec::new();
        write_frame(&mut out, b"one").await.unwrap();
        write_frame(&mut out, b"").await.unwrap();
        write_frame(&mut out, b"three").await.unwrap();

        let mut input = out.as_slice();
        assert_eq!(read_frame(&mut input).await.unwrap().unwrap(), b"one");
        assert_eq!(read_frame(&mut input).await.unwrap().unwrap(), b"");
        assert_eq!(read_frame(&mut input).await.unwrap().unwrap(), b"three");
        assert!(read_frame(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof_returns_none() {
        let mut input: &[u8] = &[];
        assert!(read_frame(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_header_is_framing_error() {
        let mut input: &[u8] = &[0, 0, 0];
        let err = read_frame(&mut input).await.unwrap_err();
        assert!(matches!(err, TransportError::Framing(_)));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body_is_framing_error() {
        let mut input: &[u8] = &[0, 0, 0, 0, 0, 10, b'a', b'b'];
        let err = read_frame(&mut input).await.unwrap_err();
        assert!(matches!(err, TransportError::Framing(_)));
    }

    #[tokio::test]
    async fn test_read_frame_oversized_length_is_framing_error() {
        let mut input: &[u8] = &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let err = read_frame(&mut input).await.unwrap_err();
        assert!(matches!(err, TransportError::Framing(_)));
    }

    #[tokio::test]
    async fn test_write_frame_oversized_body_is_rejected() {
        let mut out = Vec::new();
        let body = vec![0u8; MAX_FRAME_LEN + 1];
        let err = write_frame(&mut out, &body).await.unwrap_err();
        assert!(matches!(err, TransportError::Framing(_)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_frames_cross_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &[7u8; 200]).await.unwrap();
        });
        let body = read_frame(&mut b).await.unwrap().unwrap();
        writer.await.unwrap();
        assert_eq!(body, vec![7u8; 200]);
    }
}
