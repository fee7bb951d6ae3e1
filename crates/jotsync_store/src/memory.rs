//! In-memory revision-checked document store.

use bytes::Bytes;
use jotsync_remote::{
    normalize_path, Cursor, Document, Entry, Listing, PollOutcome, RemoteStore, Revision,
    StoreError, StoreResult,
};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct DocRecord {
    content: Bytes,
    rev: u64,
}

#[derive(Debug, Clone)]
struct JournalEntry {
    seq: u64,
    path: String,
    rev: u64,
}

#[derive(Debug, Default)]
struct Faults {
    listings: u32,
    polls: u32,
    downloads: u32,
    uploads: u32,
}

#[derive(Debug, Default)]
struct State {
    docs: HashMap<String, DocRecord>,
    journal: Vec<JournalEntry>,
    last_seq: u64,
    last_rev: u64,
    faults: Faults,
}

impl State {
    fn record_change(&mut self, path: &str, content: Bytes, journal_cap: usize) -> u64 {
        self.last_rev += 1;
        let rev = self.last_rev;
        self.docs.insert(path.to_string(), DocRecord { content, rev });
        self.last_seq += 1;
        self.journal.push(JournalEntry {
            seq: self.last_seq,
            path: path.to_string(),
            rev,
        });
        if self.journal.len() > journal_cap {
            let excess = self.journal.len() - journal_cap;
            self.journal.drain(..excess);
        }
        rev
    }

    /// Smallest change sequence the journal still covers continuation from.
    fn oldest_covered(&self) -> u64 {
        self.journal.first().map(|e| e.seq - 1).unwrap_or(0)
    }
}

fn rev_token(rev: u64) -> Revision {
    Revision::new(format!("rev:{rev}"))
}

fn seq_cursor(seq: u64) -> Cursor {
    Cursor::new(format!("cur:{seq}"))
}

/// Cursor into a partially enumerated snapshot: the journal sequence the
/// enumeration started at plus the last path already delivered.
fn snap_cursor(seq: u64, after_path: &str) -> Cursor {
    Cursor::new(format!("snap:{seq}:{after_path}"))
}

fn parse_seq(cursor: &Cursor) -> StoreResult<u64> {
    cursor
        .as_str()
        .strip_prefix("cur:")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Protocol(format!("unparsable cursor {cursor}")))
}

fn parse_snap(cursor: &Cursor) -> Option<(u64, &str)> {
    let rest = cursor.as_str().strip_prefix("snap:")?;
    let (seq, path) = rest.split_once(':')?;
    Some((seq.parse().ok()?, path))
}

/// An in-memory remote document store.
///
/// Documents carry monotonically increasing revisions; every write is
/// recorded in a change journal that backs listing continuation and
/// long-poll. Conditional uploads are rejected with a conflict when the
/// expected revision is stale. Methods can be made to fail with injected
/// transport errors, consumed one per call, for exercising retry paths.
pub struct MemoryStore {
    inner: Mutex<State>,
    changed: Condvar,
    page_size: usize,
    journal_cap: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State::default()),
            changed: Condvar::new(),
            page_size: 1000,
            journal_cap: 1024,
        }
    }

    /// Sets the maximum number of entries per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets how many change journal entries are retained. A continuation
    /// cursor older than the retained window falls back to a full listing.
    pub fn with_journal_cap(mut self, cap: usize) -> Self {
        self.journal_cap = cap.max(1);
        self
    }

    /// Creates or replaces a document unconditionally, bypassing the
    /// revision check. Provisioning and "another client wrote" simulation.
    pub fn create(&self, path: &str, content: impl Into<Bytes>) -> Revision {
        self.write_unchecked(path, content.into())
    }

    /// Alias of [`create`](Self::create) that reads as what tests mean by it.
    pub fn overwrite(&self, path: &str, content: impl Into<Bytes>) -> Revision {
        self.write_unchecked(path, content.into())
    }

    fn write_unchecked(&self, path: &str, content: Bytes) -> Revision {
        let path = normalize_path(path);
        let rev = {
            let mut state = self.inner.lock();
            state.record_change(&path, content, self.journal_cap)
        };
        self.changed.notify_all();
        debug!(%path, rev, "document written");
        rev_token(rev)
    }

    /// Returns the current content of a document.
    pub fn content(&self, path: &str) -> Option<Bytes> {
        let state = self.inner.lock();
        state.docs.get(&normalize_path(path)).map(|d| d.content.clone())
    }

    /// Returns the current content decoded as UTF-8.
    pub fn text(&self, path: &str) -> Option<String> {
        self.content(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns the current revision of a document.
    pub fn revision(&self, path: &str) -> Option<Revision> {
        let state = self.inner.lock();
        state.docs.get(&normalize_path(path)).map(|d| rev_token(d.rev))
    }

    /// Fails the next `n` listing calls with a transport error.
    pub fn fail_next_listings(&self, n: u32) {
        self.inner.lock().faults.listings += n;
    }

    /// Fails the next `n` long-poll calls with a transport error.
    pub fn fail_next_polls(&self, n: u32) {
        self.inner.lock().faults.polls += n;
    }

    /// Fails the next `n` download calls with a transport error.
    pub fn fail_next_downloads(&self, n: u32) {
        self.inner.lock().faults.downloads += n;
    }

    /// Fails the next `n` upload calls with a transport error.
    pub fn fail_next_uploads(&self, n: u32) {
        self.inner.lock().faults.uploads += n;
    }

    fn consume_fault(counter: &mut u32) -> StoreResult<()> {
        if *counter > 0 {
            *counter -= 1;
            Err(StoreError::transport("injected failure"))
        } else {
            Ok(())
        }
    }

    /// Pages through journal entries after `seq`.
    fn journal_page(&self, state: &State, after: u64) -> Listing {
        let entries: Vec<Entry> = state
            .journal
            .iter()
            .filter(|e| e.seq > after)
            .take(self.page_size)
            .map(|e| Entry {
                path: e.path.clone(),
                revision: rev_token(e.rev),
            })
            .collect();
        let consumed = state
            .journal
            .iter()
            .filter(|e| e.seq > after)
            .take(self.page_size)
            .last()
            .map(|e| e.seq)
            .unwrap_or(after);
        let remaining = state.journal.iter().filter(|e| e.seq > consumed).count();
        Listing {
            entries,
            cursor: seq_cursor(consumed),
            has_more: remaining > 0,
        }
    }

    /// One page of the current documents, sorted by path, resuming after
    /// `after_path` if set. `seq` is the journal position the enumeration
    /// started at; it is carried through every page so that once the
    /// snapshot is exhausted, journal continuation picks up from the moment
    /// the enumeration began and no interleaved write is skipped.
    fn snapshot_page(
        &self,
        state: &State,
        prefix: &str,
        after_path: Option<&str>,
        seq: u64,
    ) -> Listing {
        let mut entries: Vec<Entry> = state
            .docs
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .filter(|(path, _)| after_path.map_or(true, |after| path.as_str() > after))
            .map(|(path, doc)| Entry {
                path: path.clone(),
                revision: rev_token(doc.rev),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let has_more = entries.len() > self.page_size;
        entries.truncate(self.page_size);
        let cursor = match entries.last() {
            Some(last) if has_more => snap_cursor(seq, &last.path),
            _ => seq_cursor(seq),
        };
        Listing {
            entries,
            cursor,
            has_more,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    fn list(&self, prefix: &str) -> StoreResult<Listing> {
        let mut state = self.inner.lock();
        Self::consume_fault(&mut state.faults.listings)?;

        // An initial listing enumerates the current state of every matching
        // document, a page at a time, positioned so that once the snapshot
        // is exhausted a continue picks up changes from "now".
        let prefix = if prefix.is_empty() {
            "/".to_string()
        } else {
            normalize_path(prefix)
        };
        Ok(self.snapshot_page(&state, &prefix, None, state.last_seq))
    }

    fn list_continue(&self, cursor: &Cursor) -> StoreResult<Listing> {
        let mut state = self.inner.lock();
        Self::consume_fault(&mut state.faults.listings)?;

        // Snapshot continuation pages the rest of the documents. Prefix
        // filtering is not carried over; consumers filter by path.
        if let Some((seq, after_path)) = parse_snap(cursor) {
            return Ok(self.snapshot_page(&state, "/", Some(after_path), seq));
        }

        let after = parse_seq(cursor)?;
        if after < state.oldest_covered() {
            // The journal no longer reaches back that far. Re-enumerate the
            // current snapshot instead; it over-reports but misses nothing.
            debug!(after, "continuation cursor predates retained journal");
            return Ok(self.snapshot_page(&state, "/", None, state.last_seq));
        }
        Ok(self.journal_page(&state, after))
    }

    fn long_poll(&self, cursor: &Cursor, timeout: Duration) -> StoreResult<PollOutcome> {
        let after = parse_seq(cursor)?;
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        Self::consume_fault(&mut state.faults.polls)?;
        loop {
            if state.last_seq > after {
                return Ok(PollOutcome::Changed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
            let _ = self.changed.wait_for(&mut state, deadline - now);
        }
    }

    fn download(&self, path: &str) -> StoreResult<Document> {
        let mut state = self.inner.lock();
        Self::consume_fault(&mut state.faults.downloads)?;
        let path = normalize_path(path);
        state
            .docs
            .get(&path)
            .map(|doc| Document::new(doc.content.clone(), rev_token(doc.rev)))
            .ok_or(StoreError::NotFound(path))
    }

    fn upload_conditional(
        &self,
        path: &str,
        content: Bytes,
        expected: &Revision,
    ) -> StoreResult<Revision> {
        let path = normalize_path(path);
        let rev = {
            let mut state = self.inner.lock();
            Self::consume_fault(&mut state.faults.uploads)?;
            let current = state
                .docs
                .get(&path)
                .map(|doc| rev_token(doc.rev))
                .ok_or_else(|| StoreError::conflict("document missing"))?;
            if &current != expected {
                return Err(StoreError::Conflict(format!(
                    "expected {expected}, server at {current}"
                )));
            }
            state.record_change(&path, content, self.journal_cap)
        };
        self.changed.notify_all();
        debug!(%path, rev, "conditional upload accepted");
        Ok(rev_token(rev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn download_roundtrip() {
        let store = MemoryStore::new();
        let rev = store.create("/notes.txt", "a\nb\n");

        let doc = store.download("/notes.txt").unwrap();
        assert_eq!(&doc.content[..], b"a\nb\n");
        assert_eq!(doc.revision, rev);

        assert!(matches!(
            store.download("/missing.txt"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn conditional_upload_accepts_current_revision() {
        let store = MemoryStore::new();
        let rev = store.create("/notes.txt", "a\n");

        let new_rev = store
            .upload_conditional("/notes.txt", Bytes::from_static(b"a\nb"), &rev)
            .unwrap();
        assert_ne!(new_rev, rev);
        assert_eq!(store.text("/notes.txt").unwrap(), "a\nb");
    }

    #[test]
    fn conditional_upload_rejects_stale_revision() {
        let store = MemoryStore::new();
        let stale = store.create("/notes.txt", "a\n");
        store.overwrite("/notes.txt", "a\nother\n");

        let result = store.upload_conditional("/notes.txt", Bytes::from_static(b"a\nmine"), &stale);
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        // The other writer's content survives.
        assert_eq!(store.text("/notes.txt").unwrap(), "a\nother\n");
    }

    #[test]
    fn listing_reports_current_documents() {
        let store = MemoryStore::new();
        store.create("/notes.txt", "a\n");
        store.create("/other.txt", "b\n");

        let listing = store.list("").unwrap();
        assert_eq!(listing.entries.len(), 2);
        assert!(!listing.has_more);
        assert_eq!(listing.entries[0].path, "/notes.txt");
    }

    #[test]
    fn continue_returns_changes_after_cursor_in_pages() {
        let store = MemoryStore::new().with_page_size(2);
        store.create("/notes.txt", "v1\n");
        let cursor = store.list("").unwrap().cursor;

        store.overwrite("/notes.txt", "v2\n");
        store.overwrite("/notes.txt", "v3\n");
        store.overwrite("/notes.txt", "v4\n");

        let page = store.list_continue(&cursor).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert!(page.has_more);

        let rest = store.list_continue(&page.cursor).unwrap();
        assert_eq!(rest.entries.len(), 1);
        assert!(!rest.has_more);

        // Fully caught up: nothing more after the final cursor.
        let empty = store.list_continue(&rest.cursor).unwrap();
        assert!(empty.entries.is_empty());
        assert!(!empty.has_more);
    }

    #[test]
    fn initial_listing_pages_through_large_snapshots() {
        let store = MemoryStore::new().with_page_size(1);
        store.create("/a.txt", "a\n");
        store.create("/b.txt", "b\n");
        store.create("/c.txt", "c\n");

        let mut page = store.list("").unwrap();
        let mut paths = Vec::new();
        loop {
            paths.extend(page.entries.iter().map(|e| e.path.clone()));
            if !page.has_more {
                break;
            }
            page = store.list_continue(&page.cursor).unwrap();
        }
        assert_eq!(paths, vec!["/a.txt", "/b.txt", "/c.txt"]);

        // The exhausted cursor continues as a change cursor.
        store.overwrite("/b.txt", "b2\n");
        let changes = store.list_continue(&page.cursor).unwrap();
        assert_eq!(changes.entries.len(), 1);
        assert_eq!(changes.entries[0].path, "/b.txt");
    }

    #[test]
    fn snapshot_pagination_does_not_skip_interleaved_writes() {
        let store = MemoryStore::new().with_page_size(1);
        store.create("/a.txt", "a\n");
        store.create("/b.txt", "b\n");

        let first = store.list("").unwrap();
        assert!(first.has_more);

        // A document already delivered changes mid-enumeration.
        store.overwrite("/a.txt", "a2\n");

        let second = store.list_continue(&first.cursor).unwrap();
        assert_eq!(second.entries[0].path, "/b.txt");
        assert!(!second.has_more);

        // The change landed after the enumeration began, so the journal
        // continuation still reports it.
        let changes = store.list_continue(&second.cursor).unwrap();
        assert_eq!(changes.entries.len(), 1);
        assert_eq!(changes.entries[0].path, "/a.txt");
    }

    #[test]
    fn pruned_journal_cursor_falls_back_to_full_listing() {
        let store = MemoryStore::new().with_journal_cap(2);
        store.create("/notes.txt", "v1\n");
        let stale = store.list("").unwrap().cursor;

        store.overwrite("/notes.txt", "v2\n");
        store.overwrite("/notes.txt", "v3\n");
        store.overwrite("/notes.txt", "v4\n");

        // The entries between the stale cursor and the retained window are
        // gone; the continuation re-enumerates the snapshot instead.
        let listing = store.list_continue(&stale).unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].path, "/notes.txt");
        assert!(!listing.has_more);

        // And its cursor is fully caught up.
        let empty = store.list_continue(&listing.cursor).unwrap();
        assert!(empty.entries.is_empty());
    }

    #[test]
    fn long_poll_times_out_without_changes() {
        let store = MemoryStore::new();
        store.create("/notes.txt", "a\n");
        let cursor = store.list("").unwrap().cursor;

        let outcome = store
            .long_poll(&cursor, Duration::from_millis(20))
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[test]
    fn long_poll_wakes_on_write() {
        let store = Arc::new(MemoryStore::new());
        store.create("/notes.txt", "a\n");
        let cursor = store.list("").unwrap().cursor;

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.overwrite("/notes.txt", "a\nb\n");
            })
        };

        let outcome = store.long_poll(&cursor, Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, PollOutcome::Changed);
        writer.join().unwrap();
    }

    #[test]
    fn injected_faults_consumed_one_per_call() {
        let store = MemoryStore::new();
        store.create("/notes.txt", "a\n");
        store.fail_next_downloads(1);

        assert!(matches!(
            store.download("/notes.txt"),
            Err(StoreError::Transport(_))
        ));
        assert!(store.download("/notes.txt").is_ok());
    }

    #[test]
    fn unparsable_cursor_is_protocol_error() {
        let store = MemoryStore::new();
        let result = store.list_continue(&Cursor::new("garbage"));
        assert!(matches!(result, Err(StoreError::Protocol(_))));
    }
}
