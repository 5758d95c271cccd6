//! The top-level exposure service: orchestration of one status check and
//! the single-flight discipline around it.
//!
//! The matching capability and backend calls are expensive and rate
//! limited, so at most one check runs per process at a time. A second
//! caller arriving mid-check awaits the same in-flight future and observes
//! the identical result; the slot is cleared by the check itself on
//! completion so the next invocation starts fresh.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::Mutex;

use crate::ServiceResources;
use crate::bridge::{ContagiousDateInfo, ExposureMatcher};
use crate::config::ConfigurationResolver;
use crate::error::{CapabilityError, SubmissionError};
use crate::evaluator::ExposureEvaluator;
use crate::machine::StatusMachine;
use crate::notify::NotificationDispatcher;
use crate::status::ExposureStatus;
use crate::storage::StatusStore;
use crate::submission::SubmissionManager;
use crate::utils::device_offset;

type InFlightCheck = Shared<BoxFuture<'static, ExposureStatus>>;

struct ServiceInner {
    matcher: Arc<dyn ExposureMatcher>,
    machine: StatusMachine,
    resolver: ConfigurationResolver,
    evaluator: ExposureEvaluator,
    submission: SubmissionManager,
    dispatcher: NotificationDispatcher,
}

impl ServiceInner {
    /// One full check cycle: resolve configuration, evaluate exposure,
    /// transition, notify. Infallible by design — every failure inside the
    /// pipeline degrades to "finalize the status as-is and retry later".
    #[tracing::instrument(skip_all)]
    async fn run_check(&self) -> ExposureStatus {
        let now = OffsetDateTime::now_utc();
        let configuration = self.resolver.resolve().await;
        let outcome = self
            .evaluator
            .evaluate(&self.machine, &configuration, now)
            .await;

        match outcome.summaries.into_iter().next() {
            Some(most_relevant) => {
                self.machine
                    .transition_exposed(most_relevant, outcome.checkpoint, now)
                    .await;
            }
            None => {
                let current = self.machine.current().await;
                self.machine.finalize(current, outcome.checkpoint, now).await;
            }
        }

        self.dispatcher.dispatch(&self.machine, now).await;
        self.machine.current().await
    }
}

/// Device-side exposure-notification service. Cheap to clone; all clones
/// share the same status, stores, and single-flight slot.
#[derive(Clone)]
pub struct ExposureService {
    inner: Arc<ServiceInner>,
    in_flight: Arc<Mutex<Option<InFlightCheck>>>,
}

impl ExposureService {
    pub fn new(resources: ServiceResources) -> Self {
        Self::with_offset(resources, device_offset())
    }

    /// Like [`ExposureService::new`] but with an explicit device-local UTC
    /// offset (exposure aging uses local calendar days).
    pub fn with_offset(resources: ServiceResources, local_offset: UtcOffset) -> Self {
        let ServiceResources {
            matcher,
            backend,
            presenter,
            store,
            secure_store,
        } = resources;
        let inner = ServiceInner {
            matcher: matcher.clone(),
            machine: StatusMachine::new(StatusStore::new(store.clone()), local_offset),
            resolver: ConfigurationResolver::new(backend.clone(), store),
            evaluator: ExposureEvaluator::new(matcher.clone(), backend.clone()),
            submission: SubmissionManager::new(backend, matcher, secure_store),
            dispatcher: NotificationDispatcher::new(presenter),
        };
        Self {
            inner: Arc::new(inner),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Session start: bring up the matching capability and restore the
    /// persisted status.
    #[tracing::instrument(skip_all)]
    pub async fn start(&self) -> Result<ExposureStatus, CapabilityError> {
        self.inner.matcher.start().await?;
        Ok(self.inner.machine.load().await)
    }

    /// The current in-memory status (cheap, no I/O beyond a lock).
    pub async fn status(&self) -> ExposureStatus {
        self.inner.machine.current().await
    }

    /// Run (or join) the periodic exposure check.
    ///
    /// Single-flight: if a check is already running the caller awaits its
    /// shared result instead of invoking the matching capability again.
    pub async fn perform_exposure_check(&self) -> ExposureStatus {
        let check = {
            let mut slot = self.in_flight.lock().await;
            if let Some(existing) = slot.as_ref() {
                tracing::debug!(
                    name = "service.check_joined",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Joining in-flight exposure check"
                );
                existing.clone()
            } else {
                let inner = self.inner.clone();
                let in_flight = self.in_flight.clone();
                let check: InFlightCheck = async move {
                    let status = inner.run_check().await;
                    // The check clears its own slot so the next caller
                    // starts a fresh cycle.
                    *in_flight.lock().await = None;
                    status
                }
                .boxed()
                .shared();
                *slot = Some(check.clone());
                check
            }
        };
        check.await
    }

    /// Redeem a verified one-time code; transitions into `Diagnosed` with a
    /// fresh 14-day submission cycle.
    pub async fn redeem_one_time_code(
        &self,
        code: &str,
    ) -> Result<ExposureStatus, SubmissionError> {
        self.inner
            .submission
            .redeem_one_time_code(&self.inner.machine, code, OffsetDateTime::now_utc())
            .await
    }

    /// Upload the device's temporary exposure keys for the open cycle.
    pub async fn fetch_and_submit_keys(
        &self,
        contagious: &ContagiousDateInfo,
    ) -> Result<(), SubmissionError> {
        self.inner
            .submission
            .fetch_and_submit_keys(&self.inner.machine, contagious, OffsetDateTime::now_utc())
            .await
    }

    /// User-initiated reset of a diagnosis back to monitoring.
    pub async fn clear_diagnosis(&self) {
        self.inner
            .machine
            .clear_diagnosis(OffsetDateTime::now_utc())
            .await;
    }
}
