//! Change watcher: discovers remote changes via listing and long-poll.

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use jotsync_remote::{normalize_path, Cursor, Listing, RemoteStore, StoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Receives the watcher's "the watched document changed remotely" signal.
pub trait ChangeSink: Send + Sync {
    /// Called once per listing entry matching the canonical path.
    fn remote_changed(&self);
}

/// The engine is the usual sink: a remote change triggers a download if idle.
impl<S: RemoteStore> ChangeSink for SyncEngine<S> {
    fn remote_changed(&self) {
        self.request_download_if_idle();
    }
}

/// Which call the watcher loop issues next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Enumerate changes (full listing if no cursor yet, else continue).
    List,
    /// Block on a long-poll at the current cursor.
    Poll,
}

/// Continuously discovers changes to the watched document and signals the
/// sink to pull.
///
/// The loop lists the watched prefix to obtain a cursor, pages through any
/// remaining results, then long-polls that cursor. Both a change signal and a
/// protocol timeout lead back to listing with the same cursor; transport
/// failures retry with the last known cursor. The watcher only ever triggers
/// downloads, because remote listings only report server-side changes.
pub struct ChangeWatcher<S: RemoteStore> {
    store: Arc<S>,
    sink: Arc<dyn ChangeSink>,
    config: SyncConfig,
    cursor: Option<Cursor>,
    cancelled: Arc<AtomicBool>,
}

impl<S: RemoteStore + 'static> ChangeWatcher<S> {
    /// Creates a watcher over the given store, signalling `sink`.
    pub fn new(store: Arc<S>, sink: Arc<dyn ChangeSink>, config: SyncConfig) -> Self {
        Self {
            store,
            sink,
            config,
            cursor: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the watcher loop on its own thread.
    pub fn spawn(mut self) -> WatcherHandle {
        let cancelled = Arc::clone(&self.cancelled);
        let thread = thread::Builder::new()
            .name("jotsync-watcher".into())
            .spawn(move || self.run())
            .expect("failed to spawn watcher thread");
        WatcherHandle {
            cancelled,
            thread: Some(thread),
        }
    }

    /// Runs the watch loop until cancelled. Never terminates on its own; no
    /// error is fatal.
    pub fn run(&mut self) {
        info!(path = %self.config.path, "change watcher running");
        let mut phase = Phase::List;
        let mut failures = 0u32;
        while !self.cancelled.load(Ordering::SeqCst) {
            phase = self.turn(phase, &mut failures);
        }
        info!("change watcher stopped");
    }

    /// One iteration of the watch loop: issues a single call and decides the
    /// next phase.
    fn turn(&mut self, phase: Phase, failures: &mut u32) -> Phase {
        match phase {
            Phase::List => match self.list_page() {
                Ok(listing) => {
                    *failures = 0;
                    self.deliver(&listing);
                    self.cursor = Some(listing.cursor);
                    if listing.has_more {
                        Phase::List
                    } else {
                        Phase::Poll
                    }
                }
                Err(err) => {
                    warn!(error = %err, "listing failed; retrying with last cursor");
                    self.backoff(failures);
                    Phase::List
                }
            },
            Phase::Poll => {
                let cursor = self
                    .cursor
                    .clone()
                    .expect("poll phase is only entered after a completed listing");
                match self.store.long_poll(&cursor, self.config.poll_timeout) {
                    Ok(outcome) => {
                        *failures = 0;
                        debug!(?outcome, "long-poll returned; re-listing");
                        // Either way the listing at the same cursor reports
                        // whatever changed, if anything.
                        Phase::List
                    }
                    Err(err) => {
                        warn!(error = %err, "long-poll failed; retrying");
                        self.backoff(failures);
                        Phase::Poll
                    }
                }
            }
        }
    }

    fn list_page(&self) -> StoreResult<Listing> {
        match &self.cursor {
            None => self.store.list(&self.config.list_prefix),
            Some(cursor) => self.store.list_continue(cursor),
        }
    }

    fn deliver(&self, listing: &Listing) {
        for entry in &listing.entries {
            if normalize_path(&entry.path) == self.config.path {
                debug!(path = %entry.path, revision = %entry.revision, "watched document changed");
                self.sink.remote_changed();
            }
        }
    }

    fn backoff(&self, failures: &mut u32) {
        *failures += 1;
        let delay = self.config.retry.delay_for_attempt(*failures);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Owns the watcher's thread. Stops the loop on drop.
///
/// Shutdown does not interrupt a long-poll already in flight; the loop exits
/// after the current call returns, bounded by the poll timeout.
pub struct WatcherHandle {
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Stops the loop and waits for the thread to finish.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
