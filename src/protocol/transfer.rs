//! Chunked byte transfer used by both GET_FILE and PUT_FILE.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Transfer buffer size on both the send and receive paths (32KB)
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Copy exactly `len` bytes from `src` to `dst`. Returns bytes sent.
///
/// Bytes past `len` are left unread. A source that ends before `len`
/// bytes is an error, since the receiver is still waiting for the rest.
pub async fn send_chunks<R, W>(src: &mut R, len: u64, dst: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    while sent < len {
        let want = (len - sent).min(CHUNK_SIZE as u64) as usize;
        let n = src
            .read(&mut buf[..want])
            .await
            .context("Failed to read data")?;
        if n == 0 {
            bail!("Source ended after {} of {} bytes", sent, len);
        }
        dst.write_all(&buf[..n])
            .await
            .context("Failed to send data")?;
        sent += n as u64;
    }
    dst.flush().await.context("Failed to flush data")?;
    Ok(sent)
}

/// Copy up to `len` bytes from `src` to `dst`.
///
/// Stops early if `src` ends before `len` bytes arrive; the short count is
/// returned rather than treated as an error.
pub async fn receive_chunks<R, W>(src: &mut R, len: u64, dst: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    while received < len {
        let want = (len - received).min(CHUNK_SIZE as u64) as usize;
        let n = src
            .read(&mut buf[..want])
            .await
            .context("Failed to receive data")?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])
            .await
            .context("Failed to write received data")?;
        received += n as u64;
    }
    dst.flush().await.context("Failed to flush received data")?;
    Ok(received)
}
