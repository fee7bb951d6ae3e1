//! Init command implementation.

use super::doc_path;
use jotsync_remote::{RemoteStore, StoreError};
use jotsync_store::DirStore;
use std::path::Path;

/// Runs the init command.
pub fn run(
    root: &Path,
    doc: &str,
    seed: &[String],
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = DirStore::open(root)?;
    let path = doc_path(doc);

    if !force {
        match store.download(&path) {
            Ok(_) => {
                return Err(format!("{path} already exists (use --force to replace)").into());
            }
            Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let content = seed.join("\n");
    let revision = store.create(&path, &content)?;
    println!("Created {path} at {revision}");
    Ok(())
}
