//! Peer protocol server.
//!
//! Every inbound connection carries exactly one command and is served on its
//! own task. The [`Router`] holds everything a handler needs and is built
//! once at startup.

pub mod guard;

pub use guard::{AllowAll, MaxSize, PutGuard, ReadOnly};

use crate::inventory::list_inventory_async;
use crate::protocol::{self as wire, Command};
use crate::store::ContentStore;
use crate::submission::{extension_of, Submission};
use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Dispatches decoded commands to their handlers.
pub struct Router {
    store: ContentStore,
    guard: Arc<dyn PutGuard>,
}

impl Router {
    pub fn new(store: ContentStore) -> Self {
        Self {
            store,
            guard: Arc::new(AllowAll),
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn PutGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Serve a single request read from `stream`.
    pub async fn handle<S>(&self, stream: &mut S, peer: Option<SocketAddr>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let cmd = stream.read_u8().await.context("Failed to read command")?;

        match Command::from_u8(cmd) {
            Some(Command::List) => self.serve_list(stream).await,
            Some(Command::GetFile) => self.serve_get(stream).await,
            Some(Command::PutFile) => self.serve_put(stream, peer).await,
            _ => anyhow::bail!("Unknown command byte {}", cmd),
        }
    }

    async fn serve_list<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let paths = list_inventory_async(self.store.layout().clone()).await?;
        debug!("Serving inventory of {} paths", paths.len());
        wire::write_frame(stream, &wire::encode_listing(&paths)).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn serve_get<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let path = wire::read_string(stream)
            .await
            .context("Failed to read file path")?;

        let (mut file, size) = match self.open_stored(&path).await {
            Ok(opened) => opened,
            Err(message) => {
                debug!("GET {} refused: {}", path, message);
                wire::write_frame(stream, &wire::encode_status(Command::Error, &message)).await?;
                stream.flush().await?;
                return Ok(());
            }
        };

        let mut header = BytesMut::with_capacity(9);
        header.put_u8(Command::Success as u8);
        header.put_u64(size);
        wire::write_frame(stream, &header.freeze()).await?;

        let sent = wire::send_chunks(&mut file, size, stream)
            .await
            .with_context(|| format!("Failed to send {}", path))?;
        debug!("Sent {} ({} bytes)", path, sent);
        Ok(())
    }

    async fn open_stored(&self, path: &str) -> std::result::Result<(File, u64), String> {
        let full = self
            .store
            .layout()
            .resolve(path)
            .map_err(|e| e.to_string())?;
        let file = File::open(&full)
            .await
            .map_err(|e| format!("Error opening file: {}", e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| format!("Error reading file metadata: {}", e))?;
        if !meta.is_file() {
            return Err(format!("Not a regular file: {}", path));
        }
        Ok((file, meta.len()))
    }

    async fn serve_put<S>(&self, stream: &mut S, peer: Option<SocketAddr>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let path = wire::read_string(stream)
            .await
            .context("Failed to read file path")?;
        let size = stream
            .read_u64()
            .await
            .context("Failed to read file size")?;

        if let Err(message) = self.guard.check(peer, &path, size).await {
            debug!("PUT {} refused: {}", path, message);
            wire::write_frame(stream, &wire::encode_status(Command::Error, &message)).await?;
            stream.flush().await?;
            return Ok(());
        }

        let mut spool = match tempfile::tempfile() {
            Ok(f) => File::from_std(f),
            Err(e) => {
                let message = format!("Error creating temporary file: {}", e);
                wire::write_frame(stream, &wire::encode_status(Command::Error, &message)).await?;
                stream.flush().await?;
                return Ok(());
            }
        };

        stream.write_u8(Command::Success as u8).await?;
        stream.flush().await?;

        let received = wire::receive_chunks(stream, size, &mut spool).await?;
        if received < size {
            debug!("PUT {} truncated at {} of {} bytes", path, received, size);
        }

        let mut content = Vec::with_capacity(received as usize);
        spool.seek(SeekFrom::Start(0)).await?;
        spool.read_to_end(&mut content).await?;

        let name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let submission = Submission::new(content, extension_of(&name), name.clone(), name);

        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || store.store(&submission)).await?;

        let reply = match stored {
            Ok(stored) => {
                debug!("Stored upload {} as {}", path, stored.hash);
                wire::encode_status(
                    Command::Success,
                    &format!("File saved successfully with hash: {}", stored.hash),
                )
            }
            Err(e) => {
                warn!("Failed to store upload {}: {}", path, e);
                wire::encode_status(Command::Error, &format!("Error saving file: {}", e))
            }
        };
        wire::write_frame(stream, &reply).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Accept loop bound to a TCP listener.
pub struct PeerServer {
    listener: TcpListener,
    router: Arc<Router>,
    limit: Option<Arc<Semaphore>>,
}

impl PeerServer {
    /// Bind the listener. Failing to bind is the one fatal server error.
    pub async fn bind<A: ToSocketAddrs>(addr: A, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind peer listener")?;
        Ok(Self {
            listener,
            router: Arc::new(router),
            limit: None,
        })
    }

    /// Cap the number of connections served at once. Further connections
    /// are still accepted and wait for a free slot.
    pub fn with_max_connections(mut self, max: Option<usize>) -> Self {
        self.limit = max.map(|n| Arc::new(Semaphore::new(n.max(1))));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop forever.
    pub async fn run(self) -> Result<()> {
        info!("Peer server listening on {}", self.local_addr()?);

        loop {
            let (mut socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error accepting peer connection: {}", e);
                    continue;
                }
            };

            let router = Arc::clone(&self.router);
            let limit = self.limit.clone();

            tokio::spawn(async move {
                let _permit = match limit {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };

                debug!("Connection from {}", peer);
                if let Err(e) = router.handle(&mut socket, Some(peer)).await {
                    warn!("Error handling connection from {}: {:#}", peer, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;
    use tempfile::TempDir;
    use tokio::io::duplex;

    fn router(tmp: &TempDir) -> Router {
        Router::new(ContentStore::open(tmp.path()).unwrap())
    }

    #[tokio::test]
    async fn test_get_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);
        let (mut client, mut server) = duplex(64 * 1024);

        wire::write_frame(&mut client, &wire::encode_get_file("data/nope/nope.txt"))
            .await
            .unwrap();
        router.handle(&mut server, None).await.unwrap();
        drop(server);

        let err = wire::read_status(&mut client).await.unwrap_err();
        assert!(err.to_string().contains("Error opening file"));
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_get_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);
        let (mut client, mut server) = duplex(64 * 1024);

        wire::write_frame(&mut client, &wire::encode_get_file("../secret"))
            .await
            .unwrap();
        router.handle(&mut server, None).await.unwrap();

        let err = wire::read_status(&mut client).await.unwrap_err();
        assert!(err.to_string().contains("traversal"));
    }

    #[tokio::test]
    async fn test_put_then_list() {
        let tmp = TempDir::new().unwrap();
        let router = Arc::new(router(&tmp));
        let (mut client, mut server) = duplex(64 * 1024);

        let r = Arc::clone(&router);
        let handle = tokio::spawn(async move { r.handle(&mut server, None).await });

        wire::write_frame(&mut client, &wire::encode_put_file("data/x/report.txt", 5))
            .await
            .unwrap();
        wire::read_status(&mut client).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let message = wire::read_final_status(&mut client).await.unwrap();
        handle.await.unwrap().unwrap();

        let hash = content_hash(b"hello");
        assert!(message.contains(&hash));

        let (mut client, mut server) = duplex(64 * 1024);
        client.write_u8(Command::List as u8).await.unwrap();
        router.handle(&mut server, None).await.unwrap();
        let paths = wire::read_listing(&mut client).await.unwrap();
        assert!(paths.contains(&format!("data/{h}/{h}.txt", h = hash)));
        let category = content_hash(b"report.txt");
        assert!(paths.contains(&format!("data/{}/{}.txt", category, hash)));
    }

    #[tokio::test]
    async fn test_put_refused_by_guard() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp).with_guard(Arc::new(ReadOnly));
        let (mut client, mut server) = duplex(64 * 1024);

        wire::write_frame(&mut client, &wire::encode_put_file("a.txt", 3))
            .await
            .unwrap();
        router.handle(&mut server, None).await.unwrap();

        let err = wire::read_status(&mut client).await.unwrap_err();
        assert!(err.to_string().contains("does not accept uploads"));
        assert!(crate::inventory::list_inventory(router.store().layout())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let tmp = TempDir::new().unwrap();
        let router = router(&tmp);
        let (mut client, mut server) = duplex(1024);
        client.write_u8(9).await.unwrap();
        assert!(router.handle(&mut server, None).await.is_err());
    }
}
