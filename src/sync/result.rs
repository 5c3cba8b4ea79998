use serde::{Serialize, Serializer};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Inventory exchanged and every transfer succeeded.
    Success,
    /// Inventory exchanged but at least one transfer failed.
    Partial,
    /// The peer could not be reached or did not answer the listing.
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Error => "error",
        }
    }
}

/// Outcome of synchronizing with one peer.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub server: String,
    pub status: SyncStatus,
    /// `"<remote path> (saved as <hash>)"` per downloaded file.
    pub downloaded: Vec<String>,
    /// Local paths pushed to the peer.
    pub uploaded: Vec<String>,
    pub errors: Vec<String>,
    #[serde(rename = "elapsed_time", serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
}

impl SyncResult {
    pub(crate) fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            status: SyncStatus::Error,
            downloaded: Vec::new(),
            uploaded: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Status once the inventory exchange went through.
    pub(crate) fn settle(&mut self) {
        self.status = if self.errors.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        };
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

fn serialize_elapsed<S: Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:?}", elapsed))
}
