//! Peer synchronization.
//!
//! Every peer is synchronized on its own task; transfers within one peer
//! are sequential, one connection per file.

pub mod peer;
pub mod result;

pub use peer::sync_with_peer;
pub use result::{SyncResult, SyncStatus};

use crate::store::ContentStore;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct Syncer {
    store: ContentStore,
    max_peer_tasks: Option<usize>,
}

impl Syncer {
    pub fn new(store: ContentStore) -> Self {
        Self {
            store,
            max_peer_tasks: None,
        }
    }

    /// Cap how many peers are synchronized at once. `None` is unbounded.
    pub fn with_max_peer_tasks(mut self, max: Option<usize>) -> Self {
        self.max_peer_tasks = max;
        self
    }

    /// Synchronize with every non-blank address and wait for all of them.
    ///
    /// Results come back in the order the addresses were given, one per
    /// address, even when a peer's task dies.
    pub async fn sync_all<S: AsRef<str>>(&self, peers: &[S]) -> Vec<SyncResult> {
        let limit = self
            .max_peer_tasks
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let tasks = peers
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|addr| {
                let store = self.store.clone();
                let limit = limit.clone();
                let owned = addr.to_string();
                let handle = tokio::spawn(async move {
                    let _permit = match limit {
                        Some(sem) => sem.acquire_owned().await.ok(),
                        None => None,
                    };
                    sync_with_peer(&store, &owned).await
                });
                (addr.to_string(), handle)
            })
            .collect();

        join_in_order(tasks).await
    }
}

/// Await every peer task in spawn order. A task that panicked or was
/// cancelled yields an error result for its peer.
async fn join_in_order(tasks: Vec<(String, JoinHandle<SyncResult>)>) -> Vec<SyncResult> {
    let mut results = Vec::with_capacity(tasks.len());
    for (addr, handle) in tasks {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("Sync task for {} failed: {}", addr, e);
                let mut result = SyncResult::new(addr);
                result.errors.push(format!("Sync task failed: {}", e));
                results.push(result);
            }
        }
    }
    results
}
