//! Content-addressed filesystem store.
//!
//! Content is written once per distinct SHA-256 hash. Categories are
//! buckets of the same shape: a category folder holds an empty marker per
//! filed object plus an index page linking to it.

pub mod index;
pub mod layout;

pub use layout::Layout;

use crate::error::{Error, Result};
use crate::hash::{content_hash, resolve_label_hash};
use crate::submission::{Metadata, Submission};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of a successful [`ContentStore::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub hash: String,
    pub category_hash: String,
    /// Filesystem path of the content bytes.
    pub content_path: PathBuf,
    /// Root-relative link to the category page, e.g. `data/<hash>/index.html`.
    pub category_index: String,
}

/// A metadata record found by [`ContentStore::search_titles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    pub hash: String,
    pub metadata: Metadata,
}

/// Owns every byte a node keeps on disk.
///
/// Cheap to clone; all state lives on the filesystem and each call re-reads
/// what it needs.
#[derive(Debug, Clone)]
pub struct ContentStore {
    layout: Layout,
}

impl ContentStore {
    /// Open (and bootstrap) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Layout::new(root);
        for dir in layout.inventory_dirs() {
            create_dir(&dir)?;
        }
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Persist a submission under its content hash and file it under its
    /// category.
    ///
    /// Re-storing identical input is harmless: the content file is
    /// rewritten with the same bytes and index entries are not duplicated.
    /// Owner and metadata records keep whatever was written first.
    pub fn store(&self, submission: &Submission) -> Result<Stored> {
        let hash = content_hash(&submission.content);
        let category_hash = resolve_label_hash(&submission.category);
        let file_name = stored_file_name(&hash, &submission.extension);

        let content_dir = self.layout.bucket_dir(&hash);
        let category_dir = self.layout.bucket_dir(&category_hash);
        create_dir(&content_dir)?;
        create_dir(&category_dir)?;

        let content_path = content_dir.join(&file_name);
        fs::write(&content_path, &submission.content)?;

        if let Some(owner) = submission.owner.as_deref().filter(|o| !o.is_empty()) {
            if write_new(&self.layout.owner_path(&hash), owner.as_bytes())? {
                debug!("Recorded owner for {}", hash);
            }
        }

        if let Some(metadata) = submission.metadata.as_ref().filter(|m| m.is_complete()) {
            self.write_metadata(&hash, metadata)?;
        }

        // Never truncate: the marker path is the content path itself when the
        // category is the content's own hash.
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(category_dir.join(&file_name))?;

        let own_entry = index::render_entry(&hash, &file_name, &submission.display_name);
        index::append_once(&content_dir.join(layout::INDEX_FILE), &own_entry)?;

        let category_entry = index::render_entry(
            &hash,
            &format!("../{}/{}", hash, file_name),
            &submission.display_name,
        );
        let category_index_path = category_dir.join(layout::INDEX_FILE);
        index::append_once(&category_index_path, &category_entry)?;

        debug!(
            "Stored {} ({} bytes) under category {}",
            hash,
            submission.content.len(),
            category_hash
        );

        Ok(Stored {
            category_index: format!(
                "{}/{}/{}",
                layout::DATA_DIR,
                category_hash,
                layout::INDEX_FILE
            ),
            hash,
            category_hash,
            content_path,
        })
    }

    /// Owner text recorded for `hash`, if any.
    pub fn owner(&self, hash: &str) -> Result<Option<String>> {
        read_optional(&self.layout.owner_path(hash))
            .map(|b| b.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    /// Metadata recorded for `hash`, if any.
    pub fn metadata(&self, hash: &str) -> Result<Option<Metadata>> {
        match read_optional(&self.layout.metadata_path(hash))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Root-relative link to the index page of the bucket `label` names,
    /// if that bucket exists.
    ///
    /// `label` is resolved like a category, so both a content hash and a
    /// human-readable category find their page.
    pub fn lookup(&self, label: &str) -> Result<Option<String>> {
        let label = label.trim();
        if label.is_empty() {
            return Ok(None);
        }
        let hash = resolve_label_hash(label);
        let page = self.layout.bucket_dir(&hash).join(layout::INDEX_FILE);
        match fs::metadata(&page) {
            Ok(meta) if meta.is_file() => Ok(Some(format!(
                "{}/{}/{}",
                layout::DATA_DIR,
                hash,
                layout::INDEX_FILE
            ))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata records whose title contains `term`, ignoring case.
    ///
    /// Unreadable or malformed records are skipped. Results are ordered by
    /// content hash.
    pub fn search_titles(&self, term: &str) -> Result<Vec<TitleMatch>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for entry in fs::read_dir(self.layout.metadata_dir())? {
            let path = entry?.path();
            let Some(hash) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
                .map(str::to_string)
            else {
                continue;
            };

            let metadata: Metadata = match fs::read(&path)
                .map_err(Error::from)
                .and_then(|b| serde_json::from_slice::<Metadata>(&b).map_err(Error::from))
            {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping metadata record {}: {}", path.display(), e);
                    continue;
                }
            };

            if metadata.title.to_lowercase().contains(&needle) {
                matches.push(TitleMatch { hash, metadata });
            }
        }

        matches.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(matches)
    }

    fn write_metadata(&self, hash: &str, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        if write_new(&self.layout.metadata_path(hash), &json)? {
            debug!("Recorded metadata for {}", hash);
        }
        Ok(())
    }
}

/// `<hash>.<ext>`. The dot is kept even when the extension is empty so
/// peers agree on inventory paths.
pub fn stored_file_name(hash: &str, extension: &str) -> String {
    format!("{}.{}", hash, extension)
}

/// Write `data` to `path` only if nothing exists there yet.
fn write_new(path: &Path, data: &[u8]) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(data)?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn create_dir(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;
    use tempfile::TempDir;

    fn metadata(user: &str) -> Metadata {
        Metadata {
            user: user.to_string(),
            title: "title".to_string(),
            description: "description".to_string(),
            url: "https://example.org".to_string(),
        }
    }

    #[test]
    fn test_store_text_under_category() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        let submission = Submission::new(
            b"hello".to_vec(),
            "txt",
            "hello (2024.01.01 00:00:00)",
            "notes",
        );
        let stored = store.store(&submission).unwrap();

        let hash = content_hash(b"hello");
        let category = content_hash(b"notes");
        assert_eq!(stored.hash, hash);
        assert_eq!(stored.category_hash, category);
        assert_eq!(stored.category_index, format!("data/{}/index.html", category));

        let content = tmp.path().join("data").join(&hash).join(format!("{}.txt", hash));
        assert_eq!(stored.content_path, content);
        assert_eq!(fs::read(&content).unwrap(), b"hello");

        let marker = tmp.path().join("data").join(&category).join(format!("{}.txt", hash));
        assert_eq!(fs::metadata(&marker).unwrap().len(), 0);

        let page = fs::read_to_string(tmp.path().join(&stored.category_index)).unwrap();
        assert!(page.starts_with(index::INDEX_HEADER));
        assert!(page.contains(&format!(
            "<a href=\"../{h}/{h}.txt\">hello (2024.01.01 00:00:00)</a><br>",
            h = hash
        )));

        let own_page =
            fs::read_to_string(tmp.path().join("data").join(&hash).join("index.html")).unwrap();
        assert!(own_page.contains(&format!("<a href=\"{}.txt\">", hash)));
    }

    #[test]
    fn test_store_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let submission = Submission::new(b"same bytes".to_vec(), "bin", "same.bin", "things");

        let first = store.store(&submission).unwrap();
        let second = store.store(&submission).unwrap();
        assert_eq!(first, second);

        let entry = index::render_entry(
            &first.hash,
            &format!("../{h}/{h}.bin", h = first.hash),
            "same.bin",
        );
        let page = fs::read_to_string(tmp.path().join(&first.category_index)).unwrap();
        assert_eq!(page.matches(&entry).count(), 1);
    }

    #[test]
    fn test_same_bytes_different_names() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        let a = store.store(&Submission::new(b"dup".to_vec(), "txt", "a.txt", "one")).unwrap();
        let b = store.store(&Submission::new(b"dup".to_vec(), "txt", "b.txt", "two")).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.content_path, b.content_path);

        let own_page =
            fs::read_to_string(tmp.path().join("data").join(&a.hash).join("index.html")).unwrap();
        assert!(own_page.contains(">a.txt</a>"));
        assert!(own_page.contains(">b.txt</a>"));
    }

    #[test]
    fn test_owner_and_metadata_first_write_wins() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        let first = Submission::new(b"paid".to_vec(), "txt", "paid.txt", "c")
            .with_owner("bc1-first")
            .with_metadata(metadata("alice"));
        let second = Submission::new(b"paid".to_vec(), "txt", "paid.txt", "c")
            .with_owner("bc1-second")
            .with_metadata(metadata("bob"));

        let stored = store.store(&first).unwrap();
        store.store(&second).unwrap();

        assert_eq!(store.owner(&stored.hash).unwrap().as_deref(), Some("bc1-first"));
        assert_eq!(store.metadata(&stored.hash).unwrap().unwrap().user, "alice");
    }

    #[test]
    fn test_incomplete_metadata_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        let mut partial = metadata("alice");
        partial.description.clear();
        let stored = store
            .store(&Submission::new(b"m".to_vec(), "txt", "m.txt", "c").with_metadata(partial))
            .unwrap();

        assert!(store.metadata(&stored.hash).unwrap().is_none());
        assert!(store.owner(&stored.hash).unwrap().is_none());
    }

    #[test]
    fn test_category_equal_to_own_hash_keeps_bytes() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let hash = content_hash(b"payload");

        let stored = store
            .store(&Submission::new(
                b"payload".to_vec(),
                "txt",
                format!("{}.txt", hash),
                hash.clone(),
            ))
            .unwrap();

        assert_eq!(stored.category_hash, hash);
        assert_eq!(fs::read(&stored.content_path).unwrap(), b"payload");
    }

    #[test]
    fn test_empty_extension() {
        assert_eq!(stored_file_name("abc", ""), "abc.");
        assert_eq!(stored_file_name("abc", "txt"), "abc.txt");

        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let stored = store
            .store(&Submission::new(b"plain".to_vec(), "", "README", "docs"))
            .unwrap();
        assert_eq!(
            stored.content_path,
            tmp.path().join("data").join(&stored.hash).join(format!("{}.", stored.hash))
        );
        assert_eq!(fs::read(&stored.content_path).unwrap(), b"plain");
    }

    #[test]
    fn test_concurrent_stores_append_once() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let submission = Submission::new(b"contended".to_vec(), "txt", "contended.txt", "race");

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        store.store(&submission).unwrap();
                    }
                });
            }
        });

        let stored = store.store(&submission).unwrap();
        let entry = index::render_entry(
            &stored.hash,
            &format!("../{h}/{h}.txt", h = stored.hash),
            "contended.txt",
        );
        let page = fs::read_to_string(tmp.path().join(&stored.category_index)).unwrap();
        assert_eq!(page.matches(&entry).count(), 1);
        assert_eq!(page.matches(index::INDEX_HEADER).count(), 1);
        assert!(page.starts_with(index::INDEX_HEADER));

        let own_page = fs::read_to_string(
            tmp.path().join("data").join(&stored.hash).join("index.html"),
        )
        .unwrap();
        assert_eq!(own_page.matches(index::INDEX_HEADER).count(), 1);
        assert_eq!(own_page.matches(">contended.txt</a>").count(), 1);
    }

    #[test]
    fn test_lookup_by_label() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let stored = store
            .store(&Submission::new(b"hello".to_vec(), "txt", "hello.txt", "notes"))
            .unwrap();

        assert_eq!(
            store.lookup("notes").unwrap(),
            Some(stored.category_index.clone())
        );
        assert_eq!(
            store.lookup("  notes  ").unwrap(),
            Some(stored.category_index.clone())
        );
    }

    #[test]
    fn test_lookup_by_hash() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let stored = store
            .store(&Submission::new(b"hello".to_vec(), "txt", "hello.txt", "notes"))
            .unwrap();

        assert_eq!(
            store.lookup(&stored.hash).unwrap(),
            Some(format!("data/{}/index.html", stored.hash))
        );
        assert_eq!(
            store.lookup(&stored.category_hash).unwrap(),
            Some(stored.category_index)
        );
    }

    #[test]
    fn test_lookup_missing_bucket() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        assert_eq!(store.lookup("nothing here").unwrap(), None);
        assert_eq!(store.lookup(&content_hash(b"absent")).unwrap(), None);
        assert_eq!(store.lookup("   ").unwrap(), None);
    }

    #[test]
    fn test_search_titles() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        let mut rust = metadata("alice");
        rust.title = "Learning Rust".to_string();
        let mut go = metadata("bob");
        go.title = "Go in practice".to_string();

        let a = store
            .store(&Submission::new(b"a".to_vec(), "txt", "a.txt", "c").with_metadata(rust))
            .unwrap();
        store
            .store(&Submission::new(b"b".to_vec(), "txt", "b.txt", "c").with_metadata(go))
            .unwrap();
        fs::write(tmp.path().join("metadata").join("broken.json"), "{").unwrap();

        let found = store.search_titles("RUST").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hash, a.hash);
        assert_eq!(found[0].metadata.user, "alice");

        assert_eq!(store.search_titles("in").unwrap().len(), 2);
        assert!(store.search_titles("").unwrap().is_empty());
    }
}
