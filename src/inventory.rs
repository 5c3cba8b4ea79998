//! Local inventory: every regular file a node would offer to a peer.

use crate::error::Result;
use crate::store::Layout;
use ignore::WalkBuilder;
use tracing::warn;

/// List every regular file under `data/`, `metadata/` and `owners/`.
///
/// Paths are root-relative and `/`-separated, in traversal order. Missing
/// directories contribute nothing; unreadable entries are logged and
/// skipped.
pub fn list_inventory(layout: &Layout) -> Result<Vec<String>> {
    let mut paths = Vec::new();

    for dir in layout.inventory_dirs() {
        if !dir.is_dir() {
            continue;
        }

        let walker = WalkBuilder::new(&dir)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping inventory entry under {}: {}", dir.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            if let Some(rel) = layout.relative(entry.path()) {
                paths.push(rel);
            }
        }
    }

    Ok(paths)
}

/// Blocking scan moved off the async runtime.
pub async fn list_inventory_async(layout: Layout) -> anyhow::Result<Vec<String>> {
    Ok(tokio::task::spawn_blocking(move || list_inventory(&layout)).await??)
}
