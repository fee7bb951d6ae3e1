//! # jotsync Remote Store Contract
//!
//! Types and traits for the versioned, revision-checked document store that
//! the sync engine talks to.
//!
//! This crate provides:
//! - Opaque [`Revision`] and [`Cursor`] tokens
//! - [`Listing`], [`Entry`], [`Document`] and [`PollOutcome`] types
//! - The [`RemoteStore`] trait (list, long-poll, download, conditional upload)
//! - [`StoreError`] with transport/conflict classification
//! - Canonical path normalization
//! - A scriptable [`MockRemote`] for tests
//!
//! This is a pure contract crate with no I/O of its own.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod mock;
mod path;
mod store;
mod types;

pub use error::{StoreError, StoreResult};
pub use mock::{MockRemote, RemoteCall};
pub use path::normalize_path;
pub use store::RemoteStore;
pub use types::{Cursor, Document, Entry, Listing, PollOutcome, Revision};
