//! Core types shared by the store contract.

use bytes::Bytes;

/// Opaque server-assigned token identifying one version of a document.
///
/// Revisions are compared only for equality; their contents carry no meaning
/// to the client. They key optimistic-concurrency-controlled writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Wraps a server-provided token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque watcher position token.
///
/// Advances monotonically as change notifications are consumed. Not
/// persisted; it has no meaning once the owning process ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// Wraps a server-provided token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry in a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Store path of the entry, as reported by the server.
    pub path: String,
    /// Current revision of the entry.
    pub revision: Revision,
}

/// A page of listing results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Entries on this page.
    pub entries: Vec<Entry>,
    /// Cursor positioned after the last entry consumed.
    pub cursor: Cursor,
    /// True if more pages remain; continue with
    /// [`RemoteStore::list_continue`](crate::RemoteStore::list_continue).
    pub has_more: bool,
}

/// A downloaded document: content plus the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Raw document bytes.
    pub content: Bytes,
    /// Revision the content was read at.
    pub revision: Revision,
}

impl Document {
    /// Creates a document from content bytes and a revision token.
    pub fn new(content: impl Into<Bytes>, revision: Revision) -> Self {
        Self {
            content: content.into(),
            revision,
        }
    }
}

/// Outcome of a long-poll wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The watched resource changed since the cursor position.
    Changed,
    /// The protocol-level timeout elapsed with no change.
    TimedOut,
}
