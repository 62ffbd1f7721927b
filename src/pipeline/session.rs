//! Per-spider state: outcome cache and cancellation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::FileError;
use crate::types::ResultRecord;

/// Terminal outcome of one URL; failures are shared so duplicates can reuse them
pub type FileOutcome = Result<ResultRecord, Arc<FileError>>;

/// Identity of one file operation: the request fingerprint plus the store key
/// the request resolves to for the item being processed
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct OutcomeKey {
    pub(crate) fingerprint: String,
    pub(crate) path: String,
}

/// Outcomes remembered by [`OutcomeKey`] for the lifetime of a spider
#[derive(Debug, Default)]
pub(crate) struct Session {
    outcomes: Mutex<HashMap<OutcomeKey, FileOutcome>>,
    cancel: Mutex<CancellationToken>,
}

impl Session {
    /// Forget every outcome and arm a fresh cancellation token
    pub(crate) fn reset(&self) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
    }

    /// Cancel in-flight work and drop the cache
    pub(crate) fn close(&self) {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).cancel();
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Token tied to the current spider run
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn get(&self, key: &OutcomeKey) -> Option<FileOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Remember `outcome` unless it was a cancellation
    pub(crate) fn remember(&self, key: &OutcomeKey, outcome: &FileOutcome) {
        if matches!(outcome, Err(e) if matches!(**e, FileError::Cancelled)) {
            return;
        }
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), outcome.clone());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileStatus;

    fn record() -> ResultRecord {
        ResultRecord {
            url: "http://x/a.pdf".into(),
            path: "full/a.pdf".into(),
            checksum: None,
            status: FileStatus::Downloaded,
        }
    }

    fn key(fingerprint: &str, path: &str) -> OutcomeKey {
        OutcomeKey {
            fingerprint: fingerprint.into(),
            path: path.into(),
        }
    }

    #[test]
    fn remembers_successes_and_failures_but_not_cancellations() {
        let session = Session::default();
        session.remember(&key("a", "full/a"), &Ok(record()));
        session.remember(&key("b", "full/b"), &Err(Arc::new(FileError::EmptyContent)));
        session.remember(&key("c", "full/c"), &Err(Arc::new(FileError::Cancelled)));

        assert!(matches!(session.get(&key("a", "full/a")), Some(Ok(_))));
        assert!(matches!(session.get(&key("b", "full/b")), Some(Err(_))));
        assert!(session.get(&key("c", "full/c")).is_none());
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn same_fingerprint_under_another_path_is_a_miss() {
        let session = Session::default();
        session.remember(&key("a", "full/alpha.pdf"), &Ok(record()));

        assert!(session.get(&key("a", "full/alpha.pdf")).is_some());
        assert!(session.get(&key("a", "full/beta.pdf")).is_none());
    }

    #[test]
    fn close_cancels_and_reset_rearms() {
        let session = Session::default();
        session.remember(&key("a", "full/a"), &Ok(record()));
        let token = session.token();

        session.close();
        assert!(token.is_cancelled());
        assert_eq!(session.len(), 0);

        session.reset();
        assert!(!session.token().is_cancelled());
    }
}
