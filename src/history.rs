use crate::errors::ScannerError;
use crate::results::TestResult;
use crate::store::DurableStore;
use log::{debug, info, warn};
use std::collections::VecDeque;

/// Maximum number of results kept.
pub const MAX_HISTORY: usize = 10;

/// Bounded, newest-first log of completed speed tests.
///
/// The store is written before the in-memory sequence changes, so a
/// failed write leaves the history exactly as it was.
pub struct HistoryStore<S> {
    store: S,
    entries: VecDeque<TestResult>,
}

impl<S: DurableStore> HistoryStore<S> {
    /// Start empty over `store`. Call [`load`](Self::load) to read what
    /// is persisted.
    pub fn new(store: S) -> Self {
        Self { store, entries: VecDeque::with_capacity(MAX_HISTORY + 1) }
    }

    /// Read the persisted history.
    ///
    /// Absent or malformed data yields an empty history. A payload with
    /// any record that is not finite and non-negative counts as malformed.
    pub fn load(&mut self) -> Vec<TestResult> {
        self.entries = match self.store.get_history() {
            Some(history) if history.iter().all(TestResult::is_valid) => {
                if history.len() > MAX_HISTORY {
                    debug!(
                        "Truncating stored history from {} to {} results",
                        history.len(),
                        MAX_HISTORY
                    );
                }
                history.into_iter().take(MAX_HISTORY).collect()
            }
            Some(_) => {
                warn!("Stored history contains invalid results, ignoring it");
                VecDeque::new()
            }
            None => VecDeque::new(),
        };

        self.snapshot()
    }

    /// Insert `result` at the front, evicting the oldest beyond
    /// [`MAX_HISTORY`], and persist the result.
    pub fn record(
        &mut self,
        result: TestResult,
    ) -> Result<Vec<TestResult>, ScannerError> {
        let mut candidate = self.entries.clone();
        candidate.push_front(result);
        candidate.truncate(MAX_HISTORY);

        self.persist(candidate)?;
        info!("Recorded result, {} in history", self.entries.len());

        Ok(self.snapshot())
    }

    /// Empty the history and persist the empty sequence.
    pub fn clear(&mut self) -> Result<Vec<TestResult>, ScannerError> {
        self.persist(VecDeque::new())?;
        info!("History cleared");

        Ok(self.snapshot())
    }

    /// Copy of the current history, newest first.
    pub fn snapshot(&self) -> Vec<TestResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(
        &mut self,
        candidate: VecDeque<TestResult>,
    ) -> Result<(), ScannerError> {
        let ordered: Vec<TestResult> = candidate.iter().cloned().collect();
        self.store.set_history(&ordered)?;
        self.entries = candidate;
        Ok(())
    }
}
