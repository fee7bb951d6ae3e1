//! The sync engine state machine.

use crate::config::SyncConfig;
use crate::listener::SyncListener;
use crate::state::{RemoteSnapshot, SyncState};
use bytes::Bytes;
use jotsync_remote::{Document, RemoteStore, Revision};
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// State and snapshot guarded together: the single-writer discipline.
struct Inner {
    state: SyncState,
    snapshot: RemoteSnapshot,
}

/// One network operation decided under the lock, performed outside it.
enum Job {
    Download,
    Upload { body: Bytes, revision: Revision },
}

/// Result of driving the state machine one network operation forward.
enum StepOutcome {
    /// Nothing to do; the engine is idle.
    Idle,
    /// The operation completed (success or resolved conflict).
    Progress,
    /// Transport failure; the same operation will be retried.
    Failed,
}

/// The sync engine keeps one local, append-only buffer consistent with one
/// remote document behind a revision-checked store.
///
/// [`append_item`](Self::append_item) and
/// [`request_download_if_idle`](Self::request_download_if_idle) may be called
/// from any thread at any time; [`run`](Self::run) drives the network
/// operations and must execute on exactly one thread (use
/// [`EngineHandle::spawn`] for the usual setup).
pub struct SyncEngine<S: RemoteStore> {
    config: SyncConfig,
    store: Arc<S>,
    listener: Arc<dyn SyncListener>,
    inner: Mutex<Inner>,
    wake: Condvar,
    cancelled: AtomicBool,
}

impl<S: RemoteStore> SyncEngine<S> {
    /// Creates a new sync engine. The snapshot starts empty with no revision;
    /// no upload is attempted until a download has completed.
    pub fn new(config: SyncConfig, store: Arc<S>, listener: Arc<dyn SyncListener>) -> Self {
        Self {
            config,
            store,
            listener,
            inner: Mutex::new(Inner {
                state: SyncState::Idle,
                snapshot: RemoteSnapshot::empty(),
            }),
            wake: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the current sync state.
    pub fn state(&self) -> SyncState {
        self.inner.lock().state.clone()
    }

    /// Returns the current materialized document.
    pub fn document(&self) -> String {
        let inner = self.inner.lock();
        inner.state.materialize(&inner.snapshot.content)
    }

    /// Appends a local item, trimming trailing whitespace.
    ///
    /// While idle this starts an upload cycle carrying exactly that item;
    /// while a download or upload is outstanding the item queues behind it.
    /// The content notification is emitted synchronously so the presentation
    /// layer reflects the optimistic local state instantly.
    pub fn append_item(&self, item: &str) {
        let item = item.trim_end().to_string();
        let (state, document) = {
            let mut inner = self.inner.lock();
            let next = match mem::take(&mut inner.state) {
                SyncState::Idle => SyncState::Uploading {
                    in_flight: vec![item],
                    pending_idle: Vec::new(),
                },
                SyncState::Downloading { mut pending_idle } => {
                    pending_idle.push(item);
                    SyncState::Downloading { pending_idle }
                }
                SyncState::Uploading {
                    in_flight,
                    mut pending_idle,
                } => {
                    pending_idle.push(item);
                    SyncState::Uploading {
                        in_flight,
                        pending_idle,
                    }
                }
            };
            inner.state = next;
            (
                inner.state.clone(),
                inner.state.materialize(&inner.snapshot.content),
            )
        };
        debug!(state = state.tag(), "item appended");
        self.listener.sync_state_changed(&state);
        self.listener.content_changed(&document);
        self.wake.notify_all();
    }

    /// Starts a download of the canonical document if the engine is idle;
    /// otherwise does nothing. This is the entry point the change watcher
    /// signals.
    pub fn request_download_if_idle(&self) {
        let state = {
            let mut inner = self.inner.lock();
            if !inner.state.is_idle() {
                return;
            }
            inner.state = SyncState::Downloading {
                pending_idle: Vec::new(),
            };
            inner.state.clone()
        };
        debug!(path = %self.config.path, "download requested");
        self.listener.sync_state_changed(&state);
        self.wake.notify_all();
    }

    /// Requests the worker loop to stop. In-flight network calls are allowed
    /// to finish; no state is unwound.
    pub fn shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Take the lock so a worker between its cancel check and its wait
        // cannot miss the wakeup.
        let _guard = self.inner.lock();
        self.wake.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Drives the engine until shutdown: performs whatever network operation
    /// the current state calls for, applies backoff across consecutive
    /// transport failures, and parks while idle.
    pub fn run(&self) {
        info!(path = %self.config.path, "sync engine running");
        let mut failures = 0u32;
        let mut degraded = false;

        while !self.is_cancelled() {
            match self.step_once() {
                StepOutcome::Idle => {
                    let mut inner = self.inner.lock();
                    if self.is_cancelled() {
                        break;
                    }
                    if inner.state.is_idle() {
                        self.wake.wait(&mut inner);
                    }
                }
                StepOutcome::Progress => {
                    failures = 0;
                    if degraded {
                        degraded = false;
                        info!("connectivity recovered");
                        self.listener.connectivity_changed(false);
                    }
                }
                StepOutcome::Failed => {
                    failures += 1;
                    if !degraded && failures >= self.config.retry.degraded_after {
                        degraded = true;
                        warn!(failures, "connectivity degraded");
                        self.listener.connectivity_changed(true);
                    }
                    let delay = self.config.retry.delay_for_attempt(failures);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
        info!("sync engine stopped");
    }

    /// Runs the state machine until it settles back to idle. Intended for
    /// one-shot callers that append and then want to wait for the commit.
    pub fn drain(&self) {
        let mut failures = 0u32;
        loop {
            match self.step_once() {
                StepOutcome::Idle => break,
                StepOutcome::Progress => failures = 0,
                StepOutcome::Failed => {
                    failures += 1;
                    let delay = self.config.retry.delay_for_attempt(failures);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }

    /// Performs at most one network operation and applies its completion.
    fn step_once(&self) -> StepOutcome {
        let Some(job) = self.begin_step() else {
            return StepOutcome::Idle;
        };

        match job {
            Job::Download => match self.store.download(&self.config.path) {
                Ok(document) => {
                    self.apply_download(document);
                    StepOutcome::Progress
                }
                Err(err) if err.is_transport() => {
                    warn!(error = %err, "download failed; retrying");
                    StepOutcome::Failed
                }
                Err(err) => {
                    panic!("download of {} failed irrecoverably: {err}", self.config.path)
                }
            },
            Job::Upload { body, revision } => {
                match self
                    .store
                    .upload_conditional(&self.config.path, body.clone(), &revision)
                {
                    Ok(new_revision) => {
                        self.apply_upload_success(body, new_revision);
                        StepOutcome::Progress
                    }
                    Err(err) if err.is_conflict() => {
                        info!(error = %err, "upload conflicted; folding and re-fetching");
                        self.apply_upload_conflict();
                        StepOutcome::Progress
                    }
                    Err(err) if err.is_transport() => {
                        warn!(error = %err, "upload failed; retrying");
                        StepOutcome::Failed
                    }
                    Err(err) => {
                        panic!("upload to {} failed irrecoverably: {err}", self.config.path)
                    }
                }
            }
        }
    }

    /// Decides the next network operation under the lock.
    ///
    /// Entering an upload first folds any items appended since the
    /// transition into the in-flight list, so the uploaded body is exactly
    /// what a success will record as the new snapshot. An upload requested
    /// before any revision has been observed turns into a download carrying
    /// everything pending.
    fn begin_step(&self) -> Option<Job> {
        let mut notify = None;
        let job = {
            let mut inner = self.inner.lock();
            match inner.state {
                SyncState::Idle => None,
                SyncState::Downloading { .. } => Some(Job::Download),
                SyncState::Uploading { .. } => {
                    let SyncState::Uploading {
                        mut in_flight,
                        pending_idle,
                    } = mem::take(&mut inner.state)
                    else {
                        unreachable!()
                    };
                    let folded = !pending_idle.is_empty();
                    in_flight.extend(pending_idle);

                    match inner.snapshot.revision.clone() {
                        None => {
                            debug!("no revision observed yet; downloading before upload");
                            inner.state = SyncState::Downloading {
                                pending_idle: in_flight,
                            };
                            notify = Some(inner.state.clone());
                            Some(Job::Download)
                        }
                        Some(revision) => {
                            inner.state = SyncState::Uploading {
                                in_flight,
                                pending_idle: Vec::new(),
                            };
                            if folded {
                                notify = Some(inner.state.clone());
                            }
                            let body =
                                Bytes::from(inner.state.materialize(&inner.snapshot.content));
                            Some(Job::Upload { body, revision })
                        }
                    }
                }
            }
        };
        if let Some(state) = notify {
            self.listener.sync_state_changed(&state);
        }
        job
    }

    /// Applies a successful download: records the new snapshot, publishes the
    /// content, and either settles to idle or flushes accumulated items into
    /// an upload.
    fn apply_download(&self, document: Document) {
        let (state, text) = {
            let mut inner = self.inner.lock();
            inner.snapshot = RemoteSnapshot {
                content: document.content,
                revision: Some(document.revision),
            };
            let text = inner.state.materialize(&inner.snapshot.content);
            let SyncState::Downloading { pending_idle } = mem::take(&mut inner.state) else {
                unreachable!("download completion outside downloading state")
            };
            inner.state = if pending_idle.is_empty() {
                SyncState::Idle
            } else {
                SyncState::Uploading {
                    in_flight: pending_idle,
                    pending_idle: Vec::new(),
                }
            };
            (inner.state.clone(), text)
        };
        debug!(state = state.tag(), "download applied");
        self.listener.content_changed(&text);
        self.listener.sync_state_changed(&state);
    }

    /// Applies a successful upload: the uploaded body becomes the snapshot at
    /// the new revision. Items appended during the flight start the next
    /// cycle. The materialized document is unchanged, so only the state
    /// notification fires.
    fn apply_upload_success(&self, body: Bytes, revision: Revision) {
        let state = {
            let mut inner = self.inner.lock();
            inner.snapshot = RemoteSnapshot {
                content: body,
                revision: Some(revision),
            };
            let SyncState::Uploading {
                in_flight: _,
                pending_idle,
            } = mem::take(&mut inner.state)
            else {
                unreachable!("upload completion outside uploading state")
            };
            inner.state = if pending_idle.is_empty() {
                SyncState::Idle
            } else {
                SyncState::Uploading {
                    in_flight: pending_idle,
                    pending_idle: Vec::new(),
                }
            };
            inner.state.clone()
        };
        debug!(state = state.tag(), "upload committed");
        self.listener.sync_state_changed(&state);
    }

    /// Applies a rejected upload: someone else changed the document. All
    /// uncommitted items fold into one pending list and a re-fetch begins;
    /// the next cycle re-submits everything on top of the fresh snapshot.
    fn apply_upload_conflict(&self) {
        let state = {
            let mut inner = self.inner.lock();
            let SyncState::Uploading {
                mut in_flight,
                pending_idle,
            } = mem::take(&mut inner.state)
            else {
                unreachable!("upload completion outside uploading state")
            };
            in_flight.extend(pending_idle);
            inner.state = SyncState::Downloading {
                pending_idle: in_flight,
            };
            inner.state.clone()
        };
        self.listener.sync_state_changed(&state);
    }
}

/// Owns the engine's worker thread. Shuts the engine down on drop.
pub struct EngineHandle<S: RemoteStore + 'static> {
    engine: Arc<SyncEngine<S>>,
    thread: Option<JoinHandle<()>>,
}

impl<S: RemoteStore + 'static> EngineHandle<S> {
    /// Spawns the worker thread driving the given engine.
    pub fn spawn(engine: Arc<SyncEngine<S>>) -> Self {
        let worker = Arc::clone(&engine);
        let thread = thread::Builder::new()
            .name("jotsync-engine".into())
            .spawn(move || worker.run())
            .expect("failed to spawn engine worker thread");
        Self {
            engine,
            thread: Some(thread),
        }
    }

    /// Returns the engine being driven.
    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    /// Stops the worker and waits for it to finish.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.engine.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<S: RemoteStore + 'static> Drop for EngineHandle<S> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
