//! Content addressing.
//!
//! Every stored object and every category bucket is named by a lowercase
//! SHA-256 hex digest.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Hash arbitrary bytes into a content identifier.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns true when `input` already looks like a content identifier.
///
/// Upper-case hex digits are accepted, matching how labels are typed by
/// hand.
pub fn is_hash(input: &str) -> bool {
    input.len() == HASH_HEX_LEN && input.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Map a category label to its bucket hash.
///
/// A label that is already a digest is used verbatim, so callers can file
/// content directly under an existing bucket. Anything else is hashed.
pub fn resolve_label_hash(label: &str) -> String {
    if is_hash(label) {
        label.to_string()
    } else {
        content_hash(label.as_bytes())
    }
}
