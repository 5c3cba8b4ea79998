//! Client side of the peer protocol.
//!
//! A session is one TCP connection and therefore one command; each method
//! consumes the session.

use crate::protocol::{self as wire, Command};
use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Connection to a remote peer server
pub struct PeerSession {
    stream: TcpStream,
}

impl PeerSession {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;
        Ok(Self { stream })
    }

    /// Fetch the peer's inventory.
    pub async fn list(mut self) -> Result<Vec<String>> {
        self.stream
            .write_u8(Command::List as u8)
            .await
            .context("Failed to send list command")?;
        self.stream.flush().await?;
        wire::read_listing(&mut self.stream).await
    }

    /// Download `path` into `dst`. Returns the number of bytes received,
    /// which is short if the peer closed the connection early.
    pub async fn get_file<W>(mut self, path: &str, dst: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        wire::write_frame(&mut self.stream, &wire::encode_get_file(path))
            .await
            .context("Failed to send get request")?;
        self.stream.flush().await?;

        wire::read_status(&mut self.stream).await?;
        let size = self
            .stream
            .read_u64()
            .await
            .context("Failed to read file size")?;

        wire::receive_chunks(&mut self.stream, size, dst).await
    }

    /// Upload the local file `src` under the advertised `path`.
    /// Returns the peer's final message.
    pub async fn put_file(mut self, path: &str, src: &mut File) -> Result<String> {
        let size = src
            .metadata()
            .await
            .context("Failed to read file info")?
            .len();

        wire::write_frame(&mut self.stream, &wire::encode_put_file(path, size))
            .await
            .context("Failed to send put request")?;
        self.stream.flush().await?;

        wire::read_status(&mut self.stream).await?;
        // Send exactly the announced size even if the file changes meanwhile.
        wire::send_chunks(src, size, &mut self.stream)
            .await
            .with_context(|| format!("Failed to upload {}", path))?;

        wire::read_final_status(&mut self.stream)
            .await
            .context("Upload was not finalized")
    }
}
