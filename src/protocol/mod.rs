//! Peer wire protocol.
//!
//! One command per TCP connection. The first byte the client sends is the
//! command; everything after it is command-specific.
//!
//! Wire format: all multi-byte integers are big-endian and unsigned.
//!
//! ```text
//! LIST     c->s  01
//!          s->c  len:u32 | newline-joined inventory paths
//! GET_FILE c->s  02 | path_len:u32 | path
//!          s->c  04 | msg_len:u32 | msg                      (error)
//!          s->c  05 | size:u64 | bytes in 32 KiB chunks      (success)
//! PUT_FILE c->s  03 | path_len:u32 | path | size:u64
//!          s->c  05                                          (ready)
//!          c->s  bytes in 32 KiB chunks
//!          s->c  04|05 | msg_len:u32 | msg                   (final)
//! ```

pub mod transfer;

pub use transfer::{receive_chunks, send_chunks, CHUNK_SIZE};

use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for path and status message lengths read off the wire.
pub const MAX_MESSAGE_LEN: u32 = 64 * 1024;

// =============================================================================
// Command bytes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    List = 1,
    GetFile = 2,
    PutFile = 3,
    Error = 4,
    Success = 5,
}

impl Command {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::List),
            2 => Some(Self::GetFile),
            3 => Some(Self::PutFile),
            4 => Some(Self::Error),
            5 => Some(Self::Success),
            _ => None,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// `GET_FILE` request header.
pub fn encode_get_file(path: &str) -> Bytes {
    let path_bytes = path.as_bytes();
    let mut buf = BytesMut::with_capacity(1 + 4 + path_bytes.len());
    buf.put_u8(Command::GetFile as u8);
    buf.put_u32(path_bytes.len() as u32);
    buf.put_slice(path_bytes);
    buf.freeze()
}

/// `PUT_FILE` request header; the file bytes follow once the server is ready.
pub fn encode_put_file(path: &str, size: u64) -> Bytes {
    let path_bytes = path.as_bytes();
    let mut buf = BytesMut::with_capacity(1 + 4 + path_bytes.len() + 8);
    buf.put_u8(Command::PutFile as u8);
    buf.put_u32(path_bytes.len() as u32);
    buf.put_slice(path_bytes);
    buf.put_u64(size);
    buf.freeze()
}

/// Inventory reply: length-prefixed, newline-joined paths.
pub fn encode_listing(paths: &[String]) -> Bytes {
    let joined = paths.join("\n");
    let mut buf = BytesMut::with_capacity(4 + joined.len());
    buf.put_u32(joined.len() as u32);
    buf.put_slice(joined.as_bytes());
    buf.freeze()
}

/// Status byte followed by a length-prefixed message.
pub fn encode_status(status: Command, message: &str) -> Bytes {
    let msg = message.as_bytes();
    let mut buf = BytesMut::with_capacity(1 + 4 + msg.len());
    buf.put_u8(status as u8);
    buf.put_u32(msg.len() as u32);
    buf.put_slice(msg);
    buf.freeze()
}

/// Split a listing payload into paths, dropping blank lines.
pub fn decode_listing(payload: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .split('\n')
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Reading
// =============================================================================

/// Read a `u32`-prefixed UTF-8 string, refusing anything over
/// [`MAX_MESSAGE_LEN`].
pub async fn read_string<R: AsyncRead + Unpin>(r: &mut R) -> Result<String> {
    let len = r.read_u32().await.context("Failed to read length")?;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!(
            "Length {} exceeds maximum allowed size {}",
            len,
            MAX_MESSAGE_LEN
        );
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)
        .await
        .context("Failed to read payload")?;
    String::from_utf8(buf).context("Invalid UTF-8 on the wire")
}

/// Read the inventory reply sent for `LIST`.
pub async fn read_listing<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<String>> {
    let len = r.read_u32().await.context("Failed to read list size")?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)
        .await
        .context("Failed to read file list")?;
    Ok(decode_listing(&buf))
}

/// Read a status byte. `Error` statuses are turned into an `Err` carrying
/// the remote message.
pub async fn read_status<R: AsyncRead + Unpin>(r: &mut R) -> Result<()> {
    let status = r.read_u8().await.context("Failed to read status")?;
    match Command::from_u8(status) {
        Some(Command::Success) => Ok(()),
        Some(Command::Error) => {
            let message = read_string(r)
                .await
                .context("Failed to read error message")?;
            anyhow::bail!("Remote error: {}", message)
        }
        _ => anyhow::bail!("Unexpected status byte {}", status),
    }
}

/// Read a final status with its message, which is present on success too.
pub async fn read_final_status<R: AsyncRead + Unpin>(r: &mut R) -> Result<String> {
    read_status(r).await?;
    read_string(r)
        .await
        .context("Failed to read success message")
}

// =============================================================================
// Writing
// =============================================================================

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Bytes) -> Result<()> {
    w.write_all(frame).await.context("Failed to write frame")?;
    Ok(())
}
