// src/localstore/subscriptions.rs

use tokio::sync::watch;

use super::LocalStore;
use super::schema::PullCodec;
use crate::common::{Address, BIN_COUNT, MAX_PO};
use crate::error::{Result, StoreError};

/// Per-bin wake-up channels for pull index consumers.
///
/// A notification carries no data and coalesces with earlier ones that were
/// not observed yet. Receivers re-query the pull index after waking.
#[derive(Debug)]
pub struct PullNotifier {
    bins: Vec<watch::Sender<()>>,
}

impl Default for PullNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PullNotifier {
    pub fn new() -> Self {
        Self {
            bins: (0..BIN_COUNT).map(|_| watch::channel(()).0).collect(),
        }
    }

    pub fn subscribe(&self, bin: u8) -> Result<watch::Receiver<()>> {
        self.bins
            .get(bin as usize)
            .map(|tx| tx.subscribe())
            .ok_or(StoreError::InvalidBin(bin))
    }

    pub fn notify(&self, bin: u8) {
        if let Some(tx) = self.bins.get(bin as usize) {
            tx.send_replace(());
        }
    }
}

/// One pull index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullItem {
    pub address: Address,
    pub bin_id: u64,
}

impl LocalStore {
    /// Receiver that changes whenever a chunk lands in the pull index of
    /// `bin`.
    pub fn subscribe_pull(&self, bin: u8) -> Result<watch::Receiver<()>> {
        self.pull_notifier.subscribe(bin)
    }

    /// Pull index entries of `bin` with `since <= bin_id`, and `bin_id <=
    /// until` unless `until` is 0, in bin id order.
    pub fn pull_range(&self, bin: u8, since: u64, until: u64) -> Result<Vec<PullItem>> {
        if bin > MAX_PO {
            return Err(StoreError::InvalidBin(bin));
        }
        let items = self
            .pull
            .scan(&[bin], Some(PullCodec::start_key(bin, since).as_slice()), None)?;
        Ok(items
            .into_iter()
            .take_while(|item| until == 0 || item.bin_id <= until)
            .map(|item| PullItem {
                address: item.address,
                bin_id: item.bin_id,
            })
            .collect())
    }

    /// Highest bin id present in the pull index of `bin`.
    pub fn last_pull_bin_id(&self, bin: u8) -> Result<Option<u64>> {
        if bin > MAX_PO {
            return Err(StoreError::InvalidBin(bin));
        }
        Ok(self.pull.scan(&[bin], None, None)?.last().map(|item| item.bin_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_marks_only_that_bin() {
        let notifier = PullNotifier::new();
        let mut rx3 = notifier.subscribe(3).unwrap();
        let rx4 = notifier.subscribe(4).unwrap();

        notifier.notify(3);
        notifier.notify(3);
        assert!(rx3.has_changed().unwrap());
        assert!(!rx4.has_changed().unwrap());

        rx3.borrow_and_update();
        assert!(!rx3.has_changed().unwrap());
    }

    #[test]
    fn out_of_range_bins_are_rejected() {
        let notifier = PullNotifier::new();
        assert!(matches!(notifier.subscribe(MAX_PO + 1), Err(StoreError::InvalidBin(_))));
        notifier.notify(MAX_PO + 1);
    }

    #[tokio::test]
    async fn waiter_wakes_on_notify() {
        let notifier = std::sync::Arc::new(PullNotifier::new());
        let mut rx = notifier.subscribe(0).unwrap();
        let n = notifier.clone();
        let waiter = tokio::spawn(async move { rx.changed().await.is_ok() });
        tokio::task::yield_now().await;
        n.notify(0);
        assert!(waiter.await.unwrap());
    }
}
