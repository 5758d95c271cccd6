//! Exposure evaluation: turn the resolved configuration plus the fetch
//! checkpoint into ranked exposure evidence.
//!
//! The evaluator is fail-safe by construction: any failure inside the
//! pipeline degrades to an empty summary set with no checkpoint, so a bad
//! cycle leaves the persisted status untouched and the next scheduled check
//! retries from the same position.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::bridge::{Backend, ExposureMatcher};
use crate::config::ExposureConfiguration;
use crate::error::CapabilityError;
use crate::fetcher::KeyFileFetcher;
use crate::machine::StatusMachine;
use crate::status::ExposureSummary;
use crate::utils::{Period, current_period};

#[derive(Clone, Debug, Default)]
pub struct EvaluationOutcome {
    /// Qualifying summaries, most recent exposure first.
    pub summaries: Vec<ExposureSummary>,
    /// New checkpoint candidate; `None` when nothing was processed.
    pub checkpoint: Option<Period>,
}

pub struct ExposureEvaluator {
    matcher: Arc<dyn ExposureMatcher>,
    backend: Arc<dyn Backend>,
}

impl ExposureEvaluator {
    pub fn new(matcher: Arc<dyn ExposureMatcher>, backend: Arc<dyn Backend>) -> Self {
        Self { matcher, backend }
    }

    #[tracing::instrument(skip_all)]
    pub async fn evaluate(
        &self,
        machine: &StatusMachine,
        configuration: &ExposureConfiguration,
        now: OffsetDateTime,
    ) -> EvaluationOutcome {
        match self.try_evaluate(machine, configuration, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    name = "evaluator.check_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Exposure evaluation failed, deferring to next check"
                );
                EvaluationOutcome::default()
            }
        }
    }

    async fn try_evaluate(
        &self,
        machine: &StatusMachine,
        configuration: &ExposureConfiguration,
        now: OffsetDateTime,
    ) -> Result<EvaluationOutcome, CapabilityError> {
        // The platform may have finished matching asynchronously already;
        // a queued summary set makes the key-fetch pipeline redundant.
        if let Some(pending) = self.matcher.get_pending_exposure_summary().await? {
            if !pending.is_empty() {
                tracing::info!(
                    name = "evaluator.pending_summary",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    count = pending.len(),
                    message = "Consuming platform-queued exposure summaries"
                );
                return Ok(EvaluationOutcome {
                    summaries: summaries_containing_exposures(configuration, pending),
                    checkpoint: Some(current_period(now)),
                });
            }
        }

        machine.maintain(now).await;

        let last_checked = machine.current().await.last_checked().map(|lc| lc.period);
        let fetcher = KeyFileFetcher::new(self.backend.clone(), last_checked, now);
        let (key_files, checkpoint) = fetcher.drain().await;
        if key_files.is_empty() {
            return Ok(EvaluationOutcome {
                summaries: Vec::new(),
                checkpoint,
            });
        }

        let summaries = self.matcher.detect_exposure(configuration, &key_files).await?;
        Ok(EvaluationOutcome {
            summaries: summaries_containing_exposures(configuration, summaries),
            checkpoint,
        })
    }
}

/// Keep only summaries whose combined immediate+near duration reaches the
/// configured minimum (a zero threshold keeps nothing), sorted most recent
/// exposure first. The caller treats index 0 as the most relevant.
pub fn summaries_containing_exposures(
    configuration: &ExposureConfiguration,
    summaries: Vec<ExposureSummary>,
) -> Vec<ExposureSummary> {
    let threshold = configuration.minimum_exposure_duration_minutes;
    let mut qualifying: Vec<ExposureSummary> = summaries
        .into_iter()
        .filter(|s| threshold > 0 && s.exposure_minutes() >= threshold)
        .collect();
    qualifying.sort_by(|a, b| b.last_exposure_at.cmp(&a.last_exposure_at));
    qualifying
}
