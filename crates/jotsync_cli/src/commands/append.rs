//! Append command implementation.

use super::doc_path;
use jotsync_engine::{SyncConfig, SyncEngine};
use jotsync_remote::RemoteStore;
use jotsync_store::DirStore;
use std::path::Path;
use std::sync::Arc;

/// Runs the append command: queues the items and drives the engine until the
/// commit lands.
pub fn run(root: &Path, doc: &str, items: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if items.is_empty() {
        return Err("Nothing to append".into());
    }

    let store = Arc::new(DirStore::open(root)?);
    let path = doc_path(doc);

    // Fail with a clear message instead of syncing against a document that
    // was never provisioned.
    store
        .download(&path)
        .map_err(|err| format!("{path}: {err} (run `jotsync init` first?)"))?;

    let config = SyncConfig::new(&path);
    let engine = SyncEngine::new(config, store, Arc::new(()));
    for item in items {
        engine.append_item(item);
    }
    engine.drain();

    println!("{}", engine.document());
    Ok(())
}
