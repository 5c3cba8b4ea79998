//! Node configuration.
//!
//! Read from TOML; every key is optional.
//!
//! ```toml
//! root = "~/hashbin"
//! listen = "0.0.0.0:8080"
//! max_connections = 256
//! max_peer_tasks = 8
//! peers = ["10.0.0.2:8080", "10.0.0.3:8080"]
//! allow_put = true
//! max_upload_bytes = 1073741824
//! ```

use crate::error::{Error, Result};
use crate::server::{AllowAll, MaxSize, PutGuard, ReadOnly};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub root: PathBuf,
    pub listen: String,
    pub max_connections: Option<usize>,
    pub max_peer_tasks: Option<usize>,
    pub peers: Vec<String>,
    pub allow_put: bool,
    pub max_upload_bytes: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            listen: DEFAULT_LISTEN.to_string(),
            max_connections: None,
            max_peer_tasks: None,
            peers: Vec::new(),
            allow_put: true,
            max_upload_bytes: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from the per-user config file if it exists,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };

        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(&p).map_err(|e| {
                    Error::Config(format!("Cannot read {}: {}", p.display(), e))
                })?;
                Self::parse(&text)?
            }
            None => Self::default(),
        };

        config.root = expand_tilde(&config.root);
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Admission policy for inbound uploads.
    pub fn put_guard(&self) -> Arc<dyn PutGuard> {
        match (self.allow_put, self.max_upload_bytes) {
            (false, _) => Arc::new(ReadOnly),
            (true, Some(max)) => Arc::new(MaxSize(max)),
            (true, None) => Arc::new(AllowAll),
        }
    }
}

/// `<config dir>/hashbin/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hashbin").join("config.toml"))
}

/// Expand tilde (~) in paths to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}
