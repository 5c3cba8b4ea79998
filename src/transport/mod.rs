pub mod peer;

pub use peer::PeerSession;
