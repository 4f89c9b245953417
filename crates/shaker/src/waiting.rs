//! Progress reporting and cooperative cancellation for long passes

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Polled by long-running passes at every protein, peptide or PSM boundary.
/// A pass that observes [`WaitingHandler::is_run_canceled`] stops and returns
/// no result.
pub trait WaitingHandler: Send + Sync {
    fn set_waiting_text(&self, text: &str);
    fn is_run_canceled(&self) -> bool;
    fn set_max_secondary_progress_counter(&self, max: usize);
    fn increase_secondary_progress_counter(&self);
}

/// Reports nothing, never cancels
#[derive(Copy, Clone, Debug, Default)]
pub struct SilentWaitingHandler;

impl WaitingHandler for SilentWaitingHandler {
    fn set_waiting_text(&self, _: &str) {}

    fn is_run_canceled(&self) -> bool {
        false
    }

    fn set_max_secondary_progress_counter(&self, _: usize) {}

    fn increase_secondary_progress_counter(&self) {}
}

/// Logs waiting texts and cancels once asked to, or once `limit` progress
/// steps have been made
#[derive(Debug, Default)]
pub struct CancelOnDemand {
    canceled: AtomicBool,
    progress: AtomicUsize,
    limit: Option<usize>,
}

impl CancelOnDemand {
    pub fn after(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }
}

impl WaitingHandler for CancelOnDemand {
    fn set_waiting_text(&self, text: &str) {
        log::trace!("{}", text);
    }

    fn is_run_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
            || self
                .limit
                .map(|limit| self.progress() >= limit)
                .unwrap_or(false)
    }

    fn set_max_secondary_progress_counter(&self, _: usize) {
        self.progress.store(0, Ordering::Relaxed);
    }

    fn increase_secondary_progress_counter(&self) {
        self.progress.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel_after_limit() {
        let handler = CancelOnDemand::after(2);
        handler.set_max_secondary_progress_counter(10);
        assert!(!handler.is_run_canceled());
        handler.increase_secondary_progress_counter();
        handler.increase_secondary_progress_counter();
        assert!(handler.is_run_canceled());

        let handler = CancelOnDemand::default();
        assert!(!handler.is_run_canceled());
        handler.cancel();
        assert!(handler.is_run_canceled());
    }
}
