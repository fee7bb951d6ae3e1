//! A scriptable remote store for testing.

use crate::error::{StoreError, StoreResult};
use crate::store::RemoteStore;
use crate::types::{Cursor, Document, Listing, PollOutcome, Revision};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A recorded call made against a [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `list(prefix)`.
    List {
        /// Requested prefix.
        prefix: String,
    },
    /// `list_continue(cursor)`.
    ListContinue {
        /// Continuation cursor.
        cursor: Cursor,
    },
    /// `long_poll(cursor, ..)`.
    LongPoll {
        /// Poll cursor.
        cursor: Cursor,
    },
    /// `download(path)`.
    Download {
        /// Requested path.
        path: String,
    },
    /// `upload_conditional(path, content, expected)`.
    Upload {
        /// Target path.
        path: String,
        /// Uploaded body.
        content: Bytes,
        /// Revision the upload was keyed on.
        expected: Revision,
    },
}

/// A mock remote store driven by scripted responses.
///
/// Responses are queued per call kind and consumed in order. A call with no
/// scripted response returns a [`StoreError::Protocol`] error. Every call is
/// recorded and can be inspected with [`MockRemote::calls`].
#[derive(Debug, Default)]
pub struct MockRemote {
    listings: Mutex<VecDeque<StoreResult<Listing>>>,
    polls: Mutex<VecDeque<StoreResult<PollOutcome>>>,
    downloads: Mutex<VecDeque<StoreResult<Document>>>,
    uploads: Mutex<VecDeque<StoreResult<Revision>>>,
    log: Mutex<Vec<RemoteCall>>,
}

impl MockRemote {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next `list` or `list_continue` call.
    pub fn push_listing(&self, response: StoreResult<Listing>) {
        self.listings.lock().unwrap().push_back(response);
    }

    /// Queues a response for the next `long_poll` call.
    pub fn push_poll(&self, response: StoreResult<PollOutcome>) {
        self.polls.lock().unwrap().push_back(response);
    }

    /// Queues a response for the next `download` call.
    pub fn push_download(&self, response: StoreResult<Document>) {
        self.downloads.lock().unwrap().push_back(response);
    }

    /// Queues a response for the next `upload_conditional` call.
    pub fn push_upload(&self, response: StoreResult<Revision>) {
        self.uploads.lock().unwrap().push_back(response);
    }

    /// Returns all recorded calls in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.log.lock().unwrap().clone()
    }

    /// Returns the number of upload calls recorded.
    pub fn upload_count(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Upload { .. }))
            .count()
    }

    /// Returns the number of download calls recorded.
    pub fn download_count(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Download { .. }))
            .count()
    }

    fn record(&self, call: RemoteCall) {
        self.log.lock().unwrap().push(call);
    }

    fn take<T>(queue: &Mutex<VecDeque<StoreResult<T>>>, kind: &str) -> StoreResult<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StoreError::Protocol(format!("no scripted {kind} response"))))
    }
}

impl RemoteStore for MockRemote {
    fn list(&self, prefix: &str) -> StoreResult<Listing> {
        self.record(RemoteCall::List {
            prefix: prefix.to_string(),
        });
        Self::take(&self.listings, "listing")
    }

    fn list_continue(&self, cursor: &Cursor) -> StoreResult<Listing> {
        self.record(RemoteCall::ListContinue {
            cursor: cursor.clone(),
        });
        Self::take(&self.listings, "listing")
    }

    fn long_poll(&self, cursor: &Cursor, _timeout: Duration) -> StoreResult<PollOutcome> {
        self.record(RemoteCall::LongPoll {
            cursor: cursor.clone(),
        });
        Self::take(&self.polls, "long-poll")
    }

    fn download(&self, path: &str) -> StoreResult<Document> {
        self.record(RemoteCall::Download {
            path: path.to_string(),
        });
        Self::take(&self.downloads, "download")
    }

    fn upload_conditional(
        &self,
        path: &str,
        content: Bytes,
        expected: &Revision,
    ) -> StoreResult<Revision> {
        self.record(RemoteCall::Upload {
            path: path.to_string(),
            content,
            expected: expected.clone(),
        });
        Self::take(&self.uploads, "upload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_responses_consumed_in_order() {
        let mock = MockRemote::new();
        mock.push_download(Ok(Document::new(&b"one"[..], Revision::new("rev:1"))));
        mock.push_download(Err(StoreError::transport("down")));

        let first = mock.download("/notes.txt").unwrap();
        assert_eq!(first.revision, Revision::new("rev:1"));

        let second = mock.download("/notes.txt");
        assert!(matches!(second, Err(StoreError::Transport(_))));
    }

    #[test]
    fn unscripted_call_is_protocol_error() {
        let mock = MockRemote::new();
        let result = mock.list("");
        assert!(matches!(result, Err(StoreError::Protocol(_))));
    }

    #[test]
    fn calls_are_recorded_with_arguments() {
        let mock = MockRemote::new();
        mock.push_upload(Ok(Revision::new("rev:2")));

        mock.upload_conditional("/notes.txt", Bytes::from_static(b"body"), &Revision::new("rev:1"))
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            RemoteCall::Upload {
                path: "/notes.txt".into(),
                content: Bytes::from_static(b"body"),
                expected: Revision::new("rev:1"),
            }
        );
        assert_eq!(mock.upload_count(), 1);
        assert_eq!(mock.download_count(), 0);
    }
}
