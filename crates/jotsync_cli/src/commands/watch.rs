//! Watch command implementation.

use super::doc_path;
use jotsync_engine::{
    ChangeSink, ChangeWatcher, EngineHandle, SyncConfig, SyncEngine, SyncListener, SyncState,
};
use jotsync_store::DirStore;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Prints every materialized document revision to stdout.
struct PrintListener;

impl SyncListener for PrintListener {
    fn sync_state_changed(&self, state: &SyncState) {
        tracing::debug!(state = state.tag(), "sync state changed");
    }

    fn content_changed(&self, document: &str) {
        println!("--- {} ---", unix_timestamp());
        println!("{document}");
    }

    fn connectivity_changed(&self, degraded: bool) {
        if degraded {
            eprintln!("warning: connectivity degraded, retrying in background");
        } else {
            eprintln!("connectivity recovered");
        }
    }
}

/// Seconds since the epoch; enough to tell updates apart in a terminal.
fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Runs the watch command: syncs continuously, appending lines from stdin.
pub fn run(root: &Path, doc: &str, poll_timeout: u64) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(
        DirStore::open(root)?.with_poll_interval(Duration::from_millis(500)),
    );
    let path = doc_path(doc);
    let config = SyncConfig::new(&path).with_poll_timeout(Duration::from_secs(poll_timeout));

    let engine = Arc::new(SyncEngine::new(
        config.clone(),
        Arc::clone(&store),
        Arc::new(PrintListener),
    ));
    let engine_handle = EngineHandle::spawn(Arc::clone(&engine));
    engine.request_download_if_idle();

    let sink = Arc::clone(&engine) as Arc<dyn ChangeSink>;
    let watcher_handle = ChangeWatcher::new(store, sink, config).spawn();

    eprintln!("watching {path}; type a line to append, EOF (Ctrl-D) to quit");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            engine.append_item(&line);
        }
    }

    watcher_handle.shutdown();
    engine_handle.shutdown();
    Ok(())
}
