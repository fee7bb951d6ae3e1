//! Sync state and remote snapshot types.

use bytes::Bytes;
use jotsync_remote::Revision;

/// Last known server-side truth.
///
/// Replaced atomically on every successful download or upload, never mutated
/// in place. A `None` revision means no download has completed yet; the
/// engine fetches before attempting any upload in that case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteSnapshot {
    /// Raw document bytes as the server last reported them.
    pub content: Bytes,
    /// Revision the content was observed at.
    pub revision: Option<Revision>,
}

impl RemoteSnapshot {
    /// An empty snapshot with no revision observed.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The current state of the sync engine. Exactly one variant is active at a
/// time, and the tag itself enforces that at most one network operation is
/// outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No pending local items, no network operation outstanding.
    #[default]
    Idle,
    /// A download is outstanding.
    Downloading {
        /// Items appended by the user while the download is in flight.
        pending_idle: Vec<String>,
    },
    /// An upload is outstanding.
    Uploading {
        /// Items the outstanding upload carries.
        in_flight: Vec<String>,
        /// Items appended after the upload started.
        pending_idle: Vec<String>,
    },
}

impl SyncState {
    /// Returns true if no network operation is outstanding.
    pub fn is_idle(&self) -> bool {
        matches!(self, SyncState::Idle)
    }

    /// Short tag for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Downloading { .. } => "downloading",
            SyncState::Uploading { .. } => "uploading",
        }
    }

    /// Builds the document visible to the presentation layer: the snapshot
    /// text with trailing whitespace trimmed, followed by in-flight items,
    /// then pending items, each on its own line.
    ///
    /// # Panics
    ///
    /// Panics if `content` is not valid UTF-8. A successful download that
    /// cannot be decoded is an unrecoverable precondition failure, not a
    /// transient condition.
    pub fn materialize(&self, content: &[u8]) -> String {
        let base = match std::str::from_utf8(content) {
            Ok(text) => text.trim_end(),
            Err(err) => panic!("remote document is not valid UTF-8: {err}"),
        };

        let mut lines: Vec<&str> = Vec::with_capacity(1 + self.pending_len());
        lines.push(base);
        match self {
            SyncState::Idle => {}
            SyncState::Downloading { pending_idle } => {
                lines.extend(pending_idle.iter().map(String::as_str));
            }
            SyncState::Uploading {
                in_flight,
                pending_idle,
            } => {
                lines.extend(in_flight.iter().map(String::as_str));
                lines.extend(pending_idle.iter().map(String::as_str));
            }
        }
        lines.join("\n")
    }

    fn pending_len(&self) -> usize {
        match self {
            SyncState::Idle => 0,
            SyncState::Downloading { pending_idle } => pending_idle.len(),
            SyncState::Uploading {
                in_flight,
                pending_idle,
            } => in_flight.len() + pending_idle.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_materializes_trimmed_snapshot() {
        assert_eq!(SyncState::Idle.materialize(b"a\nb\n"), "a\nb");
        assert_eq!(SyncState::Idle.materialize(b"a\nb \t\n\n"), "a\nb");
        assert_eq!(SyncState::Idle.materialize(b""), "");
    }

    #[test]
    fn pending_items_each_on_own_line() {
        let state = SyncState::Downloading {
            pending_idle: vec!["c".into(), "d".into()],
        };
        assert_eq!(state.materialize(b"a\nb\n"), "a\nb\nc\nd");
    }

    #[test]
    fn uploading_orders_in_flight_before_pending() {
        let state = SyncState::Uploading {
            in_flight: vec!["c".into()],
            pending_idle: vec!["d".into(), "e".into()],
        };
        assert_eq!(state.materialize(b"a\nb\n"), "a\nb\nc\nd\ne");
    }

    #[test]
    fn empty_snapshot_keeps_leading_line() {
        // A never-written document materializes pending items below an empty
        // first line, matching what an upload of that body round-trips to.
        let state = SyncState::Uploading {
            in_flight: vec!["x".into()],
            pending_idle: vec![],
        };
        assert_eq!(state.materialize(b""), "\nx");
    }

    #[test]
    fn state_tags() {
        assert!(SyncState::Idle.is_idle());
        assert_eq!(SyncState::Idle.tag(), "idle");
        let state = SyncState::Downloading {
            pending_idle: vec![],
        };
        assert!(!state.is_idle());
        assert_eq!(state.tag(), "downloading");
    }
}
