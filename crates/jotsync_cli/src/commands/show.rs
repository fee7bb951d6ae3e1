//! Show command implementation.

use super::doc_path;
use jotsync_remote::RemoteStore;
use jotsync_store::DirStore;
use std::path::Path;

/// Runs the show command.
pub fn run(root: &Path, doc: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = DirStore::open(root)?;
    let path = doc_path(doc);

    let document = store.download(&path)?;
    let text = std::str::from_utf8(&document.content)?;
    println!("{text}");
    Ok(())
}
