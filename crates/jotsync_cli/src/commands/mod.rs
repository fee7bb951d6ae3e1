//! CLI command implementations.

pub mod append;
pub mod init;
pub mod show;
pub mod watch;

use jotsync_remote::normalize_path;

/// Maps a document name to its canonical store path.
pub fn doc_path(doc: &str) -> String {
    normalize_path(doc)
}
