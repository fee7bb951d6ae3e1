//! The remote document store trait.

use crate::error::StoreResult;
use crate::types::{Cursor, Document, Listing, PollOutcome, Revision};
use bytes::Bytes;
use std::time::Duration;

/// A versioned, revision-checked document store.
///
/// This trait abstracts the storage API, allowing different backends
/// (in-memory, directory-backed, an HTTP file service, mock for testing).
/// All methods block the calling thread; implementations are expected to
/// bound `long_poll` by the given timeout.
///
/// Two failure kinds matter to callers: [`StoreError::Transport`] means the
/// call may be retried with identical parameters, and
/// [`StoreError::Conflict`] on [`upload_conditional`] means another writer
/// changed the document since `expected` was observed.
///
/// [`StoreError::Transport`]: crate::StoreError::Transport
/// [`StoreError::Conflict`]: crate::StoreError::Conflict
/// [`upload_conditional`]: RemoteStore::upload_conditional
pub trait RemoteStore: Send + Sync {
    /// Enumerates entries under `prefix` from the beginning, returning the
    /// first page and a cursor for continuation or long-polling.
    fn list(&self, prefix: &str) -> StoreResult<Listing>;

    /// Continues a listing from a previously returned cursor.
    fn list_continue(&self, cursor: &Cursor) -> StoreResult<Listing>;

    /// Blocks until the store reports a change after `cursor`, or `timeout`
    /// elapses.
    fn long_poll(&self, cursor: &Cursor, timeout: Duration) -> StoreResult<PollOutcome>;

    /// Downloads the document at `path`.
    fn download(&self, path: &str) -> StoreResult<Document>;

    /// Replaces the document at `path` only if its current revision still
    /// equals `expected`; returns the new revision on success.
    fn upload_conditional(
        &self,
        path: &str,
        content: Bytes,
        expected: &Revision,
    ) -> StoreResult<Revision>;
}
