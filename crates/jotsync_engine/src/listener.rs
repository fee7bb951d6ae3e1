//! Presentation-layer listener contract.

use crate::state::SyncState;

/// Receives state and content change notifications from the sync engine.
///
/// Notifications are emitted after the engine releases its internal lock, so
/// listener implementations may call back into the engine. The engine calls
/// listeners from both the appending thread and its worker thread; an
/// implementation that needs strict ordering should serialize internally.
pub trait SyncListener: Send + Sync {
    /// Called on every sync state transition.
    fn sync_state_changed(&self, state: &SyncState);

    /// Called whenever the materialized document changes.
    fn content_changed(&self, document: &str);

    /// Called when connectivity degrades (consecutive transport failures
    /// passed the configured threshold) and again when it recovers.
    fn connectivity_changed(&self, _degraded: bool) {}
}

/// A listener that ignores all notifications.
impl SyncListener for () {
    fn sync_state_changed(&self, _state: &SyncState) {}

    fn content_changed(&self, _document: &str) {}
}
