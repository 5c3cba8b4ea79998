//! On-disk layout of a node's root directory.
//!
//! ```text
//! <root>/
//!   data/<hash>/<hash>.<ext>        content bytes
//!   data/<hash>/index.html          back-links for that content
//!   data/<category>/<hash>.<ext>    zero-length category marker
//!   data/<category>/index.html      category listing
//!   owners/<hash>                   owner text
//!   metadata/<hash>.json            metadata record
//! ```

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

pub const DATA_DIR: &str = "data";
pub const OWNERS_DIR: &str = "owners";
pub const METADATA_DIR: &str = "metadata";
pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn owners_dir(&self) -> PathBuf {
        self.root.join(OWNERS_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// The three directories that make up a node's inventory.
    pub fn inventory_dirs(&self) -> [PathBuf; 3] {
        [self.data_dir(), self.metadata_dir(), self.owners_dir()]
    }

    pub fn bucket_dir(&self, hash: &str) -> PathBuf {
        self.data_dir().join(hash)
    }

    pub fn owner_path(&self, hash: &str) -> PathBuf {
        self.owners_dir().join(hash)
    }

    pub fn metadata_path(&self, hash: &str) -> PathBuf {
        self.metadata_dir().join(format!("{}.json", hash))
    }

    /// Map a root-relative inventory path onto the filesystem.
    ///
    /// Absolute paths and anything that would climb out of the root are
    /// refused.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: PathBuf::from(relative),
            reason: reason.to_string(),
        };

        if relative.is_empty() {
            return Err(invalid("empty path"));
        }

        let rel_path = Path::new(relative);
        if rel_path.is_absolute() {
            return Err(invalid("absolute paths not allowed"));
        }

        for component in rel_path.components() {
            match component {
                Component::ParentDir => return Err(invalid("path traversal not allowed")),
                Component::Prefix(_) | Component::RootDir => {
                    return Err(invalid("absolute paths not allowed"))
                }
                _ => {}
            }
        }

        let full = self.root.join(rel_path);
        if !normalize_path(&full).starts_with(normalize_path(&self.root)) {
            return Err(invalid("path escapes root directory"));
        }

        Ok(full)
    }

    /// Inverse of [`resolve`](Self::resolve): a `/`-separated path relative
    /// to the root, as sent over the wire.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

/// Normalize a path without requiring it to exist (unlike canonicalize)
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            c => normalized.push(c),
        }
    }
    normalized
}
