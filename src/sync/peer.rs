//! Reconciliation with a single peer.

use crate::inventory::list_inventory_async;
use crate::store::ContentStore;
use crate::submission::{split_extension, Submission};
use crate::sync::result::SyncResult;
use crate::transport::PeerSession;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, info, warn};

/// Pull everything the peer lists, then push every local path the peer did
/// not list.
///
/// Only a failure to obtain the peer's inventory ends the run early; every
/// other failure is recorded per file and the run continues.
pub async fn sync_with_peer(store: &ContentStore, addr: &str) -> SyncResult {
    let started = Instant::now();
    let mut result = SyncResult::new(addr);

    let remote = match fetch_inventory(addr).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!("Sync with {} failed: {:#}", addr, e);
            result.errors.push(format!("{:#}", e));
            result.elapsed = started.elapsed();
            return result;
        }
    };
    debug!("{} lists {} paths", addr, remote.len());

    // Downloads run unconditionally; storing is idempotent.
    for path in &remote {
        match download(store, addr, path).await {
            Ok(hash) => result
                .downloaded
                .push(format!("{} (saved as {})", path, hash)),
            Err(e) => result
                .errors
                .push(format!("Error downloading {}: {:#}", path, e)),
        }
    }

    let remote_set: HashSet<&str> = remote.iter().map(String::as_str).collect();
    let local = match list_inventory_async(store.layout().clone()).await {
        Ok(local) => local,
        Err(e) => {
            result
                .errors
                .push(format!("Error listing local files: {:#}", e));
            Vec::new()
        }
    };

    for path in local.iter().filter(|p| !remote_set.contains(p.as_str())) {
        match upload(store, addr, path).await {
            Ok(_) => result.uploaded.push(path.clone()),
            Err(e) => result
                .errors
                .push(format!("Error uploading {}: {:#}", path, e)),
        }
    }

    result.settle();
    result.elapsed = started.elapsed();
    info!(
        "Synced with {}: {} downloaded, {} uploaded, {} errors in {:?}",
        addr,
        result.downloaded.len(),
        result.uploaded.len(),
        result.errors.len(),
        result.elapsed
    );
    result
}

async fn fetch_inventory(addr: &str) -> Result<Vec<String>> {
    PeerSession::connect(addr)
        .await?
        .list()
        .await
        .context("Failed to read file list")
}

/// Fetch `path` from the peer and store it locally. Returns the content hash.
async fn download(store: &ContentStore, addr: &str, path: &str) -> Result<String> {
    let spool = tempfile::tempfile().context("Failed to create temp file")?;
    let mut spool = File::from_std(spool);

    let received = PeerSession::connect(addr)
        .await?
        .get_file(path, &mut spool)
        .await?;

    let mut content = Vec::with_capacity(received as usize);
    spool.seek(SeekFrom::Start(0)).await?;
    spool.read_to_end(&mut content).await?;

    let name = base_name(path);
    let (stem, extension) = split_extension(&name);
    let submission = Submission::new(content, extension, name.as_str(), stem);
    let store = store.clone();
    let stored = tokio::task::spawn_blocking(move || store.store(&submission))
        .await?
        .context("Failed to save downloaded file")?;

    debug!("Downloaded {} from {} as {}", path, addr, stored.hash);
    Ok(stored.hash)
}

/// Push the local file at inventory path `path` to the peer.
async fn upload(store: &ContentStore, addr: &str, path: &str) -> Result<String> {
    let full = store.layout().resolve(path)?;
    let mut file = File::open(&full)
        .await
        .with_context(|| format!("Failed to open {}", full.display()))?;

    let message = PeerSession::connect(addr)
        .await?
        .put_file(path, &mut file)
        .await?;

    debug!("Uploaded {} to {}: {}", path, addr, message);
    Ok(message)
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
