use tokio::sync::watch;

use super::models::{HistoryFilter, ScanRecord};

/// Subscriber side of the live history query.
///
/// Holds the latest ordered snapshot (pinned first, newest first). A new
/// snapshot is published after every mutation that changed the table.
pub struct HistorySubscription {
    rx: watch::Receiver<Vec<ScanRecord>>,
}

impl HistorySubscription {
    pub(crate) fn new(rx: watch::Receiver<Vec<ScanRecord>>) -> Self {
        Self { rx }
    }

    /// The snapshot as of now, without waiting.
    pub fn current(&self) -> Vec<ScanRecord> {
        self.rx.borrow().clone()
    }

    pub fn current_filtered(&self, filter: &HistoryFilter) -> Vec<ScanRecord> {
        self.rx
            .borrow()
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    /// Waits for the next snapshot. `None` once the database has shut down.
    pub async fn changed(&mut self) -> Option<Vec<ScanRecord>> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }
}
