use crate::protocol::constants::MAX_LINE_LEN;
use crate::protocol::error::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, trace};

const READ_CHUNK: usize = 64 * 1024;

/// Line frame: 2-byte big-endian length, then UTF-8 bytes.
pub async fn write_line<W>(stream: &mut W, text: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = text.as_bytes();
    if bytes.len() > MAX_LINE_LEN {
        error!("Refusing to send line of {} bytes", bytes.len());
        return Err(ProtocolError::LineTooLong(bytes.len()));
    }

    // One buffer so the prefix and body leave in a single write
    let mut frame = Vec::with_capacity(2 + bytes.len());
    frame.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    frame.extend_from_slice(bytes);

    stream.write_all(&frame).await?;
    stream.flush().await?;
    trace!("wrote line: {:?}", text);
    Ok(())
}

pub async fn read_line<R>(stream: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let payload = read_body(stream, len).await?;
    let text = String::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
    trace!("read line: {:?}", text);
    Ok(text)
}

/// Blob frame: 4-byte big-endian length, then raw bytes.
pub async fn write_blob<W>(stream: &mut W, data: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(data.len())
        .map_err(|_| ProtocolError::FrameTooLarge(data.len(), u32::MAX as usize))?;

    stream.write_all(&len.to_be_bytes()).await?;
    if !data.is_empty() {
        stream.write_all(data).await?;
    }
    stream.flush().await?;
    trace!("wrote blob of {} bytes", data.len());
    Ok(())
}

pub async fn read_blob<R>(stream: &mut R, max_len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_len {
        error!("Blob too large: {} bytes (max: {})", len, max_len);
        return Err(ProtocolError::FrameTooLarge(len, max_len));
    }

    let data = read_body(stream, len).await?;
    trace!("read blob of {} bytes", len);
    Ok(data)
}

/// Reads exactly `len` bytes. The buffer grows with what actually arrives,
/// not with what the peer declared.
async fn read_body<R>(stream: &mut R, len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::with_capacity(len.min(READ_CHUNK));
    (&mut *stream).take(len as u64).read_to_end(&mut data).await?;
    if data.len() < len {
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn line_is_length_prefixed() {
        let (mut a, mut b) = duplex(64);
        write_line(&mut a, "GET BY_ID 42").await.unwrap();
        drop(a);

        let mut raw = Vec::new();
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(&raw[..2], &[0, 12]);
        assert_eq!(&raw[2..], b"GET BY_ID 42");
    }

    #[tokio::test]
    async fn line_with_multibyte_text_uses_byte_length() {
        let (mut a, mut b) = duplex(64);
        write_line(&mut a, "PUT façade.txt").await.unwrap();
        let line = read_line(&mut b).await.unwrap();
        assert_eq!(line, "PUT façade.txt");
    }

    #[tokio::test]
    async fn empty_line_reads_back_empty() {
        let (mut a, mut b) = duplex(8);
        write_line(&mut a, "").await.unwrap();
        assert_eq!(read_line(&mut b).await.unwrap(), "");
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let (mut a, _b) = duplex(8);
        let text = "x".repeat(MAX_LINE_LEN + 1);
        let err = write_line(&mut a, &text).await.unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong(n) if n == MAX_LINE_LEN + 1));
    }

    #[tokio::test]
    async fn eof_before_line_is_connection_closed() {
        let (a, mut b) = duplex(8);
        drop(a);
        let err = read_line(&mut b).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn truncated_line_is_connection_closed() {
        let (mut a, mut b) = duplex(8);
        a.write_all(&[0, 10, b'a', b'b']).await.unwrap();
        drop(a);
        let err = read_line(&mut b).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_rejected() {
        let (mut a, mut b) = duplex(8);
        a.write_all(&[0, 2, 0xff, 0xfe]).await.unwrap();
        let err = read_line(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8));
    }

    #[tokio::test]
    async fn blob_uses_four_byte_prefix() {
        let (mut a, mut b) = duplex(64);
        write_blob(&mut a, &[1, 2, 3]).await.unwrap();
        drop(a);

        let mut raw = Vec::new();
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, vec![0, 0, 0, 3, 1, 2, 3]);
    }

    #[tokio::test]
    async fn blob_and_line_share_a_stream() {
        let (mut a, mut b) = duplex(1024);
        write_line(&mut a, "200").await.unwrap();
        write_blob(&mut a, b"hello").await.unwrap();
        write_blob(&mut a, b"").await.unwrap();

        assert_eq!(read_line(&mut b).await.unwrap(), "200");
        assert_eq!(read_blob(&mut b, 1024).await.unwrap(), b"hello");
        assert!(read_blob(&mut b, 1024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_blob_is_rejected_before_reading_body() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&100u32.to_be_bytes()).await.unwrap();
        let err = read_blob(&mut b, 10).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(100, 10)));
    }

    #[tokio::test]
    async fn large_declared_blob_with_short_body_is_connection_closed() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&(512u32 * 1024 * 1024).to_be_bytes()).await.unwrap();
        a.write_all(b"tiny").await.unwrap();
        drop(a);
        let err = read_blob(&mut b, usize::MAX).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn blob_larger_than_one_chunk_reads_fully() {
        let (mut a, mut b) = duplex(4096);
        let data: Vec<u8> = (0..200_000u32).map(|i| i as u8).collect();
        let sent = data.clone();
        let writer = tokio::spawn(async move { write_blob(&mut a, &sent).await.unwrap() });
        assert_eq!(read_blob(&mut b, usize::MAX).await.unwrap(), data);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn short_blob_body_is_connection_closed() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0, 0, 0, 5, 1, 2]).await.unwrap();
        drop(a);
        let err = read_blob(&mut b, 1024).await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
