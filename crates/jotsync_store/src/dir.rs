//! Directory-backed remote document store.
//!
//! Treats a directory (typically a mounted network share or otherwise shared
//! folder) as the remote store. Revisions are content hashes, so a
//! conditional upload detects any concurrent writer. Writers serialize on an
//! advisory lock file; replacement goes through a temp file and rename.
//! Long-poll is a bounded polling loop over a directory fingerprint.

use bytes::Bytes;
use fs2::FileExt;
use jotsync_remote::{
    normalize_path, Cursor, Document, Entry, Listing, PollOutcome, RemoteStore, Revision,
    StoreError, StoreResult,
};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

const LOCK_FILE: &str = ".jotsync.lock";

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn content_revision(content: &[u8]) -> Revision {
    let digest = Sha256::digest(content);
    Revision::new(format!("sha256:{}", hex(&digest)))
}

fn io_error(err: std::io::Error, path: &Path) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(path.display().to_string()),
        _ => StoreError::transport(format!("{}: {err}", path.display())),
    }
}

/// A [`RemoteStore`] over a flat directory of documents.
pub struct DirStore {
    root: PathBuf,
    poll_interval: Duration,
}

impl DirStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(e, &root))?;
        Ok(Self {
            root,
            poll_interval: Duration::from_millis(500),
        })
    }

    /// Sets how often the long-poll loop re-fingerprints the directory.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Creates or replaces a document unconditionally. Provisioning only;
    /// synchronized writes go through
    /// [`upload_conditional`](RemoteStore::upload_conditional).
    pub fn create(&self, path: &str, content: impl AsRef<[u8]>) -> StoreResult<Revision> {
        let file = self.file_for(path)?;
        let _lock = self.write_lock()?;
        self.replace_file(&file, content.as_ref())?;
        Ok(content_revision(content.as_ref()))
    }

    /// Maps a store path to a file under the root. Only flat, non-hidden
    /// names are valid document paths.
    fn file_for(&self, path: &str) -> StoreResult<PathBuf> {
        let normalized = normalize_path(path);
        let name = normalized.trim_start_matches('/');
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(StoreError::Protocol(format!(
                "invalid document path {path:?}"
            )));
        }
        Ok(self.root.join(name))
    }

    /// Takes the advisory write lock shared by all writers of this root.
    fn write_lock(&self) -> StoreResult<File> {
        let lock_path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(e, &lock_path))?;
        file.lock_exclusive()
            .map_err(|e| io_error(e, &lock_path))?;
        Ok(file)
    }

    /// Writes through a temp file and renames over the target.
    fn replace_file(&self, target: &Path, content: &[u8]) -> StoreResult<()> {
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, content).map_err(|e| io_error(e, &tmp))?;
        fs::rename(&tmp, target).map_err(|e| io_error(e, target))?;
        Ok(())
    }

    /// Lists document files with their content revisions, sorted by path.
    fn snapshot(&self) -> StoreResult<Vec<Entry>> {
        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.root).map_err(|e| io_error(e, &self.root))?;
        for item in dir {
            let item = item.map_err(|e| io_error(e, &self.root))?;
            let file_type = item.file_type().map_err(|e| io_error(e, &self.root))?;
            if !file_type.is_file() {
                continue;
            }
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(".tmp") {
                continue;
            }
            let file = item.path();
            let content = match fs::read(&file) {
                Ok(content) => content,
                // Racing a rename; the next listing sees the new file.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_error(err, &file)),
            };
            entries.push(Entry {
                path: format!("/{name}"),
                revision: content_revision(&content),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Fingerprints the whole directory state into a cursor token.
    fn fingerprint(&self) -> StoreResult<Cursor> {
        let entries = self.snapshot()?;
        let mut hasher = Sha256::new();
        for entry in &entries {
            hasher.update(entry.path.as_bytes());
            hasher.update([0]);
            hasher.update(entry.revision.as_str().as_bytes());
            hasher.update([b'\n']);
        }
        Ok(Cursor::new(format!("dir:{}", hex(&hasher.finalize()))))
    }

    fn listing(&self, prefix: &str) -> StoreResult<Listing> {
        let cursor = self.fingerprint()?;
        let mut entries = self.snapshot()?;
        if !prefix.is_empty() {
            let prefix = normalize_path(prefix);
            entries.retain(|e| normalize_path(&e.path).starts_with(&prefix));
        }
        Ok(Listing {
            entries,
            cursor,
            has_more: false,
        })
    }
}

impl RemoteStore for DirStore {
    fn list(&self, prefix: &str) -> StoreResult<Listing> {
        self.listing(prefix)
    }

    /// A directory has no change journal; continuation compares fingerprints.
    /// An unchanged directory continues empty, so a poll timeout does not
    /// re-deliver entries nobody touched. On any change everything is
    /// re-listed; consumers filter by path, so over-reporting is harmless.
    fn list_continue(&self, cursor: &Cursor) -> StoreResult<Listing> {
        let current = self.fingerprint()?;
        if &current == cursor {
            return Ok(Listing {
                entries: Vec::new(),
                cursor: current,
                has_more: false,
            });
        }
        self.listing("")
    }

    fn long_poll(&self, cursor: &Cursor, timeout: Duration) -> StoreResult<PollOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.fingerprint()?;
            if &current != cursor {
                debug!("directory fingerprint changed");
                return Ok(PollOutcome::Changed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn download(&self, path: &str) -> StoreResult<Document> {
        let file = self.file_for(path)?;
        let content = fs::read(&file).map_err(|e| io_error(e, &file))?;
        let revision = content_revision(&content);
        Ok(Document::new(content, revision))
    }

    fn upload_conditional(
        &self,
        path: &str,
        content: Bytes,
        expected: &Revision,
    ) -> StoreResult<Revision> {
        let file = self.file_for(path)?;
        let _lock = self.write_lock()?;

        let current = match fs::read(&file) {
            Ok(bytes) => content_revision(&bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::conflict("document missing"))
            }
            Err(err) => return Err(io_error(err, &file)),
        };
        if &current != expected {
            return Err(StoreError::Conflict(format!(
                "expected {expected}, directory at {current}"
            )));
        }

        self.replace_file(&file, &content)?;
        debug!(path, "conditional write accepted");
        Ok(content_revision(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> DirStore {
        DirStore::open(dir.path())
            .unwrap()
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn create_download_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let rev = store.create("/notes.txt", "a\nb\n").unwrap();
        let doc = store.download("/notes.txt").unwrap();
        assert_eq!(&doc.content[..], b"a\nb\n");
        assert_eq!(doc.revision, rev);

        assert!(matches!(
            store.download("/missing.txt"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn revisions_are_content_derived() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let rev1 = store.create("/notes.txt", "same").unwrap();
        let rev2 = store.create("/notes.txt", "same").unwrap();
        let rev3 = store.create("/notes.txt", "different").unwrap();
        assert_eq!(rev1, rev2);
        assert_ne!(rev1, rev3);
    }

    #[test]
    fn conditional_upload_checks_revision() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let rev = store.create("/notes.txt", "a\n").unwrap();

        let new_rev = store
            .upload_conditional("/notes.txt", Bytes::from_static(b"a\nb"), &rev)
            .unwrap();
        assert_ne!(new_rev, rev);

        // The old revision is now stale.
        let result = store.upload_conditional("/notes.txt", Bytes::from_static(b"a\nc"), &rev);
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(
            &store.download("/notes.txt").unwrap().content[..],
            b"a\nb"
        );
    }

    #[test]
    fn listing_skips_lock_and_temp_files() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.create("/notes.txt", "a\n").unwrap();
        fs::write(dir.path().join("scratch.tmp"), b"x").unwrap();

        let listing = store.list("").unwrap();
        let paths: Vec<&str> = listing.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/notes.txt"]);
    }

    #[test]
    fn continuation_is_empty_while_unchanged() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.create("/notes.txt", "a\n");
        let cursor = store.list("").unwrap().cursor;

        // Nothing changed; a re-list would re-trigger every watcher, so the
        // continuation must report nothing.
        let listing = store.list_continue(&cursor).unwrap();
        assert!(listing.entries.is_empty());
        assert_eq!(listing.cursor, cursor);

        store.create("/notes.txt", "a\nb\n");
        let listing = store.list_continue(&cursor).unwrap();
        let paths: Vec<&str> = listing.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/notes.txt"]);
        assert_ne!(listing.cursor, cursor);
    }

    #[test]
    fn invalid_paths_rejected() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.download("/nested/doc.txt"),
            Err(StoreError::Protocol(_))
        ));
        assert!(matches!(
            store.download("/.hidden"),
            Err(StoreError::Protocol(_))
        ));
        assert!(matches!(store.download("/"), Err(StoreError::Protocol(_))));
    }

    #[test]
    fn long_poll_times_out_when_nothing_changes() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.create("/notes.txt", "a\n").unwrap();
        let cursor = store.list("").unwrap().cursor;

        let outcome = store.long_poll(&cursor, Duration::from_millis(25)).unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[test]
    fn long_poll_sees_a_write() {
        let dir = tempdir().unwrap();
        let store = Arc::new(store(&dir));
        store.create("/notes.txt", "a\n").unwrap();
        let cursor = store.list("").unwrap().cursor;

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.create("/notes.txt", "a\nb\n").unwrap();
            })
        };

        let outcome = store.long_poll(&cursor, Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, PollOutcome::Changed);
        writer.join().unwrap();
    }
}
