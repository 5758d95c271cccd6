//! In-memory collaborator doubles shared across the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::{
    Backend, ContagiousDateInfo, CredentialSet, ExposureMatcher, KeyFileHandle, LocalNotification,
    MatcherStatus, NotificationPresenter, TemporaryExposureKey,
};
use crate::config::ExposureConfiguration;
use crate::error::{BackendError, CapabilityError, StoreError};
use crate::status::ExposureSummary;
use crate::storage::{KeyValueStore, SecureStore};
use crate::utils::Period;

/// Install a test-writer tracing subscriber once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Backend double: every period fetch succeeds with a synthetic handle
/// unless the period was explicitly failed; requested periods are recorded
/// in call order.
#[derive(Default)]
pub struct MockBackend {
    requested: Mutex<Vec<Period>>,
    failing_periods: Mutex<HashSet<Period>>,
    configuration: Mutex<Option<Result<serde_json::Value, BackendError>>>,
    reported_batches: AtomicUsize,
}

impl MockBackend {
    pub fn requested_periods(&self) -> Vec<Period> {
        self.requested.lock().unwrap().clone()
    }

    pub fn fail_period(&self, period: Period) {
        self.failing_periods.lock().unwrap().insert(period);
    }

    pub fn set_configuration(&self, response: Result<serde_json::Value, BackendError>) {
        *self.configuration.lock().unwrap() = Some(response);
    }

    pub fn reported_key_batches(&self) -> usize {
        self.reported_batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn claim_one_time_code(&self, _code: &str) -> Result<CredentialSet, BackendError> {
        Ok(CredentialSet {
            server_public_key: "server-pk".into(),
            client_public_key: "client-pk".into(),
            client_private_key: "client-sk".into(),
        })
    }

    async fn retrieve_diagnosis_keys(&self, period: Period) -> Result<KeyFileHandle, BackendError> {
        self.requested.lock().unwrap().push(period);
        if self.failing_periods.lock().unwrap().contains(&period) {
            return Err(BackendError::Network(format!(
                "download failed for period {period}"
            )));
        }
        Ok(KeyFileHandle(format!("/tmp/keys-{period}.zip")))
    }

    async fn report_diagnosis_keys(
        &self,
        _credentials: &CredentialSet,
        _keys: &[TemporaryExposureKey],
        _contagious: &ContagiousDateInfo,
    ) -> Result<(), BackendError> {
        self.reported_batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_exposure_configuration(&self) -> Result<serde_json::Value, BackendError> {
        match self.configuration.lock().unwrap().clone() {
            Some(response) => response,
            None => Err(BackendError::Network("no configuration stubbed".into())),
        }
    }
}

/// Matching-capability double with per-call failure injection, an optional
/// artificial latency on the pending-summary call (for single-flight
/// tests), and invocation counters.
#[derive(Default)]
pub struct MockMatcher {
    pending: Mutex<Option<Vec<ExposureSummary>>>,
    pending_delay: Mutex<Option<Duration>>,
    pending_calls: AtomicUsize,
    detected: Mutex<Vec<ExposureSummary>>,
    detect_calls: AtomicUsize,
    detect_failure: Mutex<Option<CapabilityError>>,
    key_history: Mutex<Vec<TemporaryExposureKey>>,
    key_history_failure: Mutex<Option<CapabilityError>>,
}

impl MockMatcher {
    pub fn set_pending(&self, pending: Option<Vec<ExposureSummary>>) {
        *self.pending.lock().unwrap() = pending;
    }

    pub fn set_pending_delay(&self, delay: Duration) {
        *self.pending_delay.lock().unwrap() = Some(delay);
    }

    pub fn pending_calls(&self) -> usize {
        self.pending_calls.load(Ordering::SeqCst)
    }

    pub fn set_detected(&self, summaries: Vec<ExposureSummary>) {
        *self.detected.lock().unwrap() = summaries;
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn fail_detection(&self, error: CapabilityError) {
        *self.detect_failure.lock().unwrap() = Some(error);
    }

    pub fn set_key_history(&self, keys: Vec<TemporaryExposureKey>) {
        *self.key_history.lock().unwrap() = keys;
    }

    pub fn fail_key_history(&self, error: CapabilityError) {
        *self.key_history_failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl ExposureMatcher for MockMatcher {
    async fn start(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn get_status(&self) -> Result<MatcherStatus, CapabilityError> {
        Ok(MatcherStatus::Active)
    }

    async fn get_pending_exposure_summary(
        &self,
    ) -> Result<Option<Vec<ExposureSummary>>, CapabilityError> {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.pending_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn detect_exposure(
        &self,
        _configuration: &ExposureConfiguration,
        _key_files: &[KeyFileHandle],
    ) -> Result<Vec<ExposureSummary>, CapabilityError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.detect_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.detected.lock().unwrap().clone())
    }

    async fn get_temporary_exposure_key_history(
        &self,
    ) -> Result<Vec<TemporaryExposureKey>, CapabilityError> {
        if let Some(error) = self.key_history_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.key_history.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MockPresenter {
    presented: Mutex<Vec<LocalNotification>>,
}

impl MockPresenter {
    pub fn presented(&self) -> Vec<LocalNotification> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationPresenter for MockPresenter {
    async fn present_local_notification(&self, notification: LocalNotification) {
        self.presented.lock().unwrap().push(notification);
    }
}
