//! hashbin - content-addressed file bin with peer-to-peer replication.
//!
//! Nodes keep content under its SHA-256 hash, file it under category
//! buckets, and reconcile with peers over a small binary TCP protocol.

pub mod config;
pub mod error;
pub mod hash;
pub mod inventory;
pub mod protocol;
pub mod server;
pub mod store;
pub mod submission;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{PeerServer, PutGuard, Router};
pub use store::{ContentStore, Stored, TitleMatch};
pub use submission::{Metadata, Submission};
pub use sync::{SyncResult, SyncStatus, Syncer};
