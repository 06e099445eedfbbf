//! Recurring sweeps
//!
//! The period trades CPU for exposure: a tracking cookie that slips past the
//! guard lives for at most one period. The task runs for the page's lifetime
//! and is never cancelled here.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::sweeper::Sweeper;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSchedule {
    period: Duration,
}

impl SweepSchedule {
    /// Zero periods are raised to one millisecond
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn on the current runtime; `None` when there is none
    pub fn spawn(&self, sweeper: Arc<Sweeper>) -> Option<JoinHandle<()>> {
        let handle = Handle::try_current().ok()?;
        Some(self.spawn_on(&handle, sweeper))
    }

    pub fn spawn_on(&self, handle: &Handle, sweeper: Arc<Sweeper>) -> JoinHandle<()> {
        let period = self.period;

        tracing::info!(period_ms = period.as_millis() as u64, "Starting periodic sweeps");

        handle.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let report = sweeper.sweep();
                if !report.deleted.is_empty() {
                    tracing::debug!(deleted = ?report.deleted, "Periodic sweep removed cookies");
                }
            }
        })
    }
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainMatrix;
    use consent_page::Page;
    use consent_storage::{ConsentState, StoreSettings};

    #[test]
    fn test_period_clamped() {
        assert_eq!(SweepSchedule::new(Duration::ZERO).period(), Duration::from_millis(1));
        assert_eq!(SweepSchedule::default().period(), DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn test_spawn_without_runtime() {
        let page = Page::new("https://www.example.com/").unwrap();
        let sweeper = Sweeper::new(
            page,
            ConsentState::new(StoreSettings::default()),
            DomainMatrix::Full,
        );

        assert!(SweepSchedule::default().spawn(sweeper).is_none());
    }

    #[tokio::test]
    async fn test_removes_header_cookie_within_interval() {
        let page = Page::new("https://www.example.com/").unwrap();
        let state = ConsentState::new(StoreSettings::default());
        let sweeper = Sweeper::new(Arc::clone(&page), state, DomainMatrix::Full);

        let handle = SweepSchedule::new(Duration::from_millis(10))
            .spawn(Arc::clone(&sweeper))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        page.receive_set_cookie_header("_gid=abc; Path=/");
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(page.cookie(), "");
        assert!(sweeper.sweep_count() >= 2);

        handle.abort();
    }
}
