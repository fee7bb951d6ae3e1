//! # jotsync Sync Engine
//!
//! Single-document sync state machine and change watcher.
//!
//! This crate provides:
//! - The sync state machine (idle → downloading → uploading)
//! - Conflict detection and fold-and-refetch resolution
//! - Retry with configurable exponential backoff
//! - A long-poll change watcher
//! - The presentation-layer listener contract
//!
//! ## Architecture
//!
//! The engine keeps one local, append-only text buffer consistent with one
//! remote copy behind a revision-checked store. It owns the last snapshot the
//! server returned (content plus revision) and whatever the user appended
//! locally but has not yet committed. A single worker thread drives at most
//! one network operation at a time; the state tag itself enforces that a
//! download and an upload are never outstanding together.
//!
//! ## Key Invariants
//!
//! - The materialized document is always the trimmed snapshot text followed
//!   by in-flight items, then pending items, one line each
//! - Appended items are never dropped: a conflict folds everything
//!   uncommitted into the next download-then-upload cycle
//! - Transport failures are retried with identical parameters and never
//!   surface to the presentation layer as failures
//! - State and snapshot mutate together under one lock, never across a
//!   network call

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod listener;
mod state;
mod watcher;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{EngineHandle, SyncEngine};
pub use listener::SyncListener;
pub use state::{RemoteSnapshot, SyncState};
pub use watcher::{ChangeSink, ChangeWatcher, WatcherHandle};
