//! # jotsync Store Backends
//!
//! Reference implementations of the
//! [`RemoteStore`](jotsync_remote::RemoteStore) contract:
//!
//! - [`MemoryStore`]: in-memory, revision-checked, with a change journal,
//!   blocking long-poll and fault injection; the backend the integration
//!   tests run against.
//! - [`DirStore`]: a directory on disk (a mounted network share, a synced
//!   folder), with content-hash revisions, lock-file-serialized conditional
//!   writes and a polling long-poll.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;
