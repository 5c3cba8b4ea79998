//! Admission hook for inbound PUT_FILE requests.

use async_trait::async_trait;
use std::net::SocketAddr;

/// Decides whether an inbound upload is accepted.
///
/// Consulted after the request header is read and before the ready signal
/// is sent. A rejection is reported to the client as an error status with
/// the returned message.
#[async_trait]
pub trait PutGuard: Send + Sync {
    async fn check(&self, peer: Option<SocketAddr>, path: &str, size: u64) -> Result<(), String>;
}

/// Accepts every upload.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl PutGuard for AllowAll {
    async fn check(
        &self,
        _peer: Option<SocketAddr>,
        _path: &str,
        _size: u64,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects every upload; for read-only nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnly;

#[async_trait]
impl PutGuard for ReadOnly {
    async fn check(
        &self,
        _peer: Option<SocketAddr>,
        _path: &str,
        _size: u64,
    ) -> Result<(), String> {
        Err("This node does not accept uploads".to_string())
    }
}

/// Rejects uploads larger than a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct MaxSize(pub u64);

#[async_trait]
impl PutGuard for MaxSize {
    async fn check(&self, _peer: Option<SocketAddr>, _path: &str, size: u64) -> Result<(), String> {
        if size > self.0 {
            Err(format!("Upload of {} bytes exceeds limit of {} bytes", size, self.0))
        } else {
            Ok(())
        }
    }
}
