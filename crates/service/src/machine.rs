//! The exposure-status state machine.
//!
//! Every mutation funnels through [`StatusMachine::finalize`], which stamps
//! a fresh `last_checked` checkpoint and persists write-through. Transition
//! logic itself never performs fallible I/O decisions: callers resolve
//! configuration, key batches and summaries before invoking it.
//!
//! Two day counts coexist deliberately: exposure aging uses device-local
//! calendar days, the submission cycle uses UTC calendar days. This
//! asymmetry is shipped behaviour and is preserved as-is.

use time::{OffsetDateTime, UtcOffset};

use crate::status::{ExposureStatus, ExposureSummary, LastChecked};
use crate::storage::StatusStore;
use crate::submission::needs_submission;
use crate::utils::{
    EXPOSURE_NOTIFICATION_CYCLE, Period, days_between, days_between_utc, from_timestamp_ms,
    timestamp_ms,
};

pub struct StatusMachine {
    store: StatusStore,
    local_offset: UtcOffset,
}

impl StatusMachine {
    pub fn new(store: StatusStore, local_offset: UtcOffset) -> Self {
        Self {
            store,
            local_offset,
        }
    }

    pub async fn load(&self) -> ExposureStatus {
        let restored = self.store.load().await;
        tracing::info!(
            name = "machine.status_restored",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            status = restored.variant(),
            message = "Restored persisted exposure status"
        );
        restored
    }

    pub async fn current(&self) -> ExposureStatus {
        self.store.current().await
    }

    /// The single mutation funnel: stamp `last_checked` and persist.
    ///
    /// The checkpoint period comes from the incoming update when the check
    /// produced one, else from the previous checkpoint, else 0 — a failed
    /// fetch cycle therefore leaves the incremental-fetch position where it
    /// was, and the next check simply retries the same periods.
    pub async fn finalize(
        &self,
        mut next: ExposureStatus,
        period: Option<Period>,
        now: OffsetDateTime,
    ) -> ExposureStatus {
        let previous = self.store.current().await;
        let period = period
            .or_else(|| previous.last_checked().map(|lc| lc.period))
            .unwrap_or(0);
        next.set_last_checked(LastChecked {
            timestamp: timestamp_ms(now),
            period,
        });
        if previous.variant() != next.variant() {
            tracing::info!(
                name = "machine.transition",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                from = previous.variant(),
                to = next.variant(),
                period = period,
                message = "Exposure status transition"
            );
        }
        self.store.replace(next.clone()).await;
        next
    }

    /// Recurring self-transitions driven purely by elapsed time: age out an
    /// old exposure, close an ended submission cycle, recompute
    /// `needs_submission` while a cycle is still open.
    pub async fn maintain(&self, now: OffsetDateTime) {
        let current = self.store.current().await;
        let submission_due = needs_submission(&current, now);
        match current {
            ExposureStatus::Monitoring { .. } => {}
            ExposureStatus::Exposed { summary, .. } => {
                if self.exposure_aged_out(&summary, now).await {
                    self.finalize(ExposureStatus::Monitoring { last_checked: None }, None, now)
                        .await;
                }
            }
            ExposureStatus::Diagnosed {
                cycle_ends_at,
                submission_last_completed_at,
                upload_reminder_last_sent_at,
                cycle_starts_at,
                ..
            } => {
                if cycle_has_ended(cycle_ends_at, now) {
                    self.finalize(ExposureStatus::Monitoring { last_checked: None }, None, now)
                        .await;
                } else {
                    self.finalize(
                        ExposureStatus::Diagnosed {
                            needs_submission: submission_due,
                            submission_last_completed_at,
                            upload_reminder_last_sent_at,
                            cycle_starts_at,
                            cycle_ends_at,
                            last_checked: None,
                        },
                        None,
                        now,
                    )
                    .await;
                }
            }
        }
    }

    /// Enter (or refresh) the `Exposed` state with new evidence.
    ///
    /// If an exposure episode is already active its summary and
    /// notification flag are kept untouched: the most severe observed
    /// exposure wins until it ages out. The durable side-channel timestamp
    /// is advanced monotonically either way.
    pub async fn transition_exposed(
        &self,
        candidate: ExposureSummary,
        period: Option<Period>,
        now: OffsetDateTime,
    ) -> ExposureStatus {
        self.store.record_last_exposure(candidate.last_exposure_at).await;
        let next = match self.store.current().await {
            ExposureStatus::Exposed {
                summary,
                notification_sent,
                ..
            } => ExposureStatus::Exposed {
                summary,
                notification_sent,
                last_checked: None,
            },
            _ => ExposureStatus::Exposed {
                summary: candidate,
                notification_sent: false,
                last_checked: None,
            },
        };
        self.finalize(next, period, now).await
    }

    /// Open a fresh 14-day submission cycle after one-time-code redemption.
    pub async fn transition_diagnosed(&self, now: OffsetDateTime) -> ExposureStatus {
        let cycle_starts_at = timestamp_ms(now);
        let cycle_ends_at = timestamp_ms(now + time::Duration::days(EXPOSURE_NOTIFICATION_CYCLE));
        self.finalize(
            ExposureStatus::Diagnosed {
                needs_submission: true,
                submission_last_completed_at: None,
                upload_reminder_last_sent_at: None,
                cycle_starts_at,
                cycle_ends_at,
                last_checked: None,
            },
            None,
            now,
        )
        .await
    }

    /// User-initiated reset of a diagnosis back to `Monitoring`.
    pub async fn clear_diagnosis(&self, now: OffsetDateTime) {
        if matches!(
            self.store.current().await,
            ExposureStatus::Diagnosed { .. }
        ) {
            self.finalize(ExposureStatus::Monitoring { last_checked: None }, None, now)
                .await;
        }
    }

    /// Credit a completed key submission. No-op unless currently diagnosed.
    pub async fn record_key_submission(&self, now: OffsetDateTime) {
        if let ExposureStatus::Diagnosed {
            upload_reminder_last_sent_at,
            cycle_starts_at,
            cycle_ends_at,
            ..
        } = self.store.current().await
        {
            self.finalize(
                ExposureStatus::Diagnosed {
                    needs_submission: false,
                    submission_last_completed_at: Some(timestamp_ms(now)),
                    upload_reminder_last_sent_at,
                    cycle_starts_at,
                    cycle_ends_at,
                    last_checked: None,
                },
                None,
                now,
            )
            .await;
        }
    }

    pub async fn mark_exposure_notified(&self, now: OffsetDateTime) {
        if let ExposureStatus::Exposed { summary, .. } = self.store.current().await {
            self.finalize(
                ExposureStatus::Exposed {
                    summary,
                    notification_sent: true,
                    last_checked: None,
                },
                None,
                now,
            )
            .await;
        }
    }

    pub async fn mark_reminder_sent(&self, now: OffsetDateTime) {
        if let ExposureStatus::Diagnosed {
            needs_submission,
            submission_last_completed_at,
            cycle_starts_at,
            cycle_ends_at,
            ..
        } = self.store.current().await
        {
            self.finalize(
                ExposureStatus::Diagnosed {
                    needs_submission,
                    submission_last_completed_at,
                    upload_reminder_last_sent_at: Some(timestamp_ms(now)),
                    cycle_starts_at,
                    cycle_ends_at,
                    last_checked: None,
                },
                None,
                now,
            )
            .await;
        }
    }

    /// Whether the active exposure is old enough to return to monitoring.
    /// Uses device-local calendar days; the explicit side-channel timestamp
    /// is authoritative, the summary's own timestamp is the read-compat
    /// fallback.
    async fn exposure_aged_out(&self, summary: &ExposureSummary, now: OffsetDateTime) -> bool {
        let last_exposure_ms = self
            .store
            .last_exposure_timestamp()
            .await
            .unwrap_or(summary.last_exposure_at);
        days_between(from_timestamp_ms(last_exposure_ms), now, self.local_offset)
            >= EXPOSURE_NOTIFICATION_CYCLE
    }
}

/// UTC calendar-day cycle-end check: the cycle is over once today is on or
/// after the cycle's end date.
pub fn cycle_has_ended(cycle_ends_at: i64, now: OffsetDateTime) -> bool {
    days_between_utc(now, from_timestamp_ms(cycle_ends_at)) <= 0
}
