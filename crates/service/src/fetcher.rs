//! Incremental retrieval of not-yet-processed diagnosis-key batches.
//!
//! The fetcher is a lazy pull-iterator over `{handle, period}` pairs,
//! newest period first, bounded below by
//! `max(last_checked_period - 1, current_period - 14)` (exclusive) so a
//! long-dormant device never backfills past one full cycle. Each per-period
//! fetch failure is logged and skipped; one bad period must not abort the
//! rest.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::bridge::{Backend, KeyFileHandle};
use crate::utils::{EXPOSURE_NOTIFICATION_CYCLE, Period, current_period};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodKeyFile {
    pub handle: KeyFileHandle,
    pub period: Period,
}

pub struct KeyFileFetcher {
    backend: Arc<dyn Backend>,
    /// Next period to try, walking downward. `None` once exhausted.
    next_period: Option<Period>,
    /// Exclusive lower bound of the walk.
    low_bound: Period,
    /// Highest period actually fetched; the new checkpoint candidate.
    max_fetched: Option<Period>,
}

impl KeyFileFetcher {
    /// Build a fetcher for all unprocessed periods since `last_checked`.
    ///
    /// Without a checkpoint only the single current-period batch is
    /// fetched: bootstrap on a fresh install must not trigger a full
    /// history backfill. With a checkpoint the walk re-fetches the
    /// checkpoint period itself (its batch keeps growing during the day)
    /// and everything newer, capped to one cycle of lookback.
    pub fn new(
        backend: Arc<dyn Backend>,
        last_checked: Option<Period>,
        now: OffsetDateTime,
    ) -> Self {
        let current = current_period(now);
        let lookback_cap = current.saturating_sub(EXPOSURE_NOTIFICATION_CYCLE as Period);
        let low_bound = match last_checked {
            Some(last) => last.saturating_sub(1).max(lookback_cap),
            None => current.saturating_sub(1),
        };
        Self {
            backend,
            next_period: (current > low_bound).then_some(current),
            low_bound,
            max_fetched: None,
        }
    }

    /// Fetch the next available key batch, skipping periods whose download
    /// fails. Returns `None` once the walk passes the lower bound.
    pub async fn next(&mut self) -> Option<PeriodKeyFile> {
        loop {
            let period = self.next_period?;
            self.next_period = period.checked_sub(1).filter(|p| *p > self.low_bound);

            match self.backend.retrieve_diagnosis_keys(period).await {
                Ok(handle) => {
                    self.max_fetched = Some(self.max_fetched.map_or(period, |m| m.max(period)));
                    return Some(PeriodKeyFile { handle, period });
                }
                Err(e) => {
                    tracing::warn!(
                        name = "fetcher.period_fetch_failed",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        period = period,
                        error = %e,
                        message = "Skipping key batch for period after fetch failure"
                    );
                }
            }
        }
    }

    /// Drain the remaining sequence into the handle batch for the matching
    /// capability, plus the checkpoint candidate (highest period actually
    /// fetched, `None` if every fetch failed).
    pub async fn drain(mut self) -> (Vec<KeyFileHandle>, Option<Period>) {
        let mut handles = Vec::new();
        while let Some(entry) = self.next().await {
            handles.push(entry.handle);
        }
        (handles, self.max_fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBackend;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-04-10 12:00 UTC);

    #[tokio::test]
    async fn bootstrap_fetches_only_the_current_period() {
        let backend = Arc::new(MockBackend::default());
        let current = current_period(NOW);

        let (handles, checkpoint) = KeyFileFetcher::new(backend.clone(), None, NOW).drain().await;

        assert_eq!(handles.len(), 1);
        assert_eq!(checkpoint, Some(current));
        assert_eq!(backend.requested_periods(), vec![current]);
    }

    #[tokio::test]
    async fn walks_newest_first_down_to_the_checkpoint() {
        let backend = Arc::new(MockBackend::default());
        let current = current_period(NOW);

        let (handles, checkpoint) =
            KeyFileFetcher::new(backend.clone(), Some(current - 3), NOW).drain().await;

        // Re-fetches the checkpoint period itself plus the three newer ones.
        assert_eq!(handles.len(), 4);
        assert_eq!(checkpoint, Some(current));
        assert_eq!(
            backend.requested_periods(),
            vec![current, current - 1, current - 2, current - 3]
        );
    }

    #[tokio::test]
    async fn lookback_is_capped_to_one_cycle() {
        let backend = Arc::new(MockBackend::default());
        let current = current_period(NOW);

        let (handles, _) = KeyFileFetcher::new(backend.clone(), Some(current - 200), NOW)
            .drain()
            .await;

        assert_eq!(handles.len(), EXPOSURE_NOTIFICATION_CYCLE as usize);
        let oldest = *backend.requested_periods().last().unwrap();
        assert_eq!(oldest, current - (EXPOSURE_NOTIFICATION_CYCLE as Period - 1));
    }

    #[tokio::test]
    async fn failed_periods_are_skipped_not_fatal() {
        let backend = Arc::new(MockBackend::default());
        let current = current_period(NOW);
        backend.fail_period(current - 1);

        let (handles, checkpoint) =
            KeyFileFetcher::new(backend.clone(), Some(current - 2), NOW).drain().await;

        assert_eq!(handles.len(), 2);
        assert_eq!(checkpoint, Some(current));
        assert_eq!(
            backend.requested_periods(),
            vec![current, current - 1, current - 2]
        );
    }

    #[tokio::test]
    async fn all_fetches_failing_yields_no_checkpoint() {
        let backend = Arc::new(MockBackend::default());
        let current = current_period(NOW);
        for p in [current, current - 1] {
            backend.fail_period(p);
        }

        let (handles, checkpoint) =
            KeyFileFetcher::new(backend, Some(current - 1), NOW).drain().await;

        assert!(handles.is_empty());
        assert_eq!(checkpoint, None);
    }

    #[tokio::test]
    async fn up_to_date_checkpoint_still_refetches_today() {
        let backend = Arc::new(MockBackend::default());
        let current = current_period(NOW);

        let (handles, checkpoint) =
            KeyFileFetcher::new(backend.clone(), Some(current), NOW).drain().await;

        assert_eq!(handles.len(), 1);
        assert_eq!(checkpoint, Some(current));
        assert_eq!(backend.requested_periods(), vec![current]);
    }
}
