//! Persistence seams and the write-through status store.
//!
//! The key/value and secure key/value providers are platform collaborators;
//! this module owns only the fixed keys, the JSON encoding, and the
//! discipline that every status mutation is persisted immediately.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::status::ExposureStatus;

pub const EXPOSURE_STATUS_KEY: &str = "exposureStatus";
pub const EXPOSURE_CONFIGURATION_KEY: &str = "exposureConfiguration";
pub const LAST_EXPOSURE_TIMESTAMP_KEY: &str = "lastExposureTimestamp";
pub const SUBMISSION_CREDENTIALS_KEY: &str = "submissionCredentials";

/// Plain key/value persistence provider (platform collaborator).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Secure key/value persistence provider, for the submission credential set.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory view of the persisted status plus write-through persistence.
///
/// Also owns the side-channel durable last-exposure timestamp, kept under
/// its own key for backward read-compatibility; that key is authoritative
/// for exposure aging and only ever moves forward.
pub struct StatusStore {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<ExposureStatus>,
}

impl StatusStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(ExposureStatus::default()),
        }
    }

    /// Load the persisted status at session start. An absent or corrupt
    /// blob falls back to `Monitoring`; session start must never fail on
    /// storage contents.
    #[tracing::instrument(skip_all)]
    pub async fn load(&self) -> ExposureStatus {
        let restored = match self.store.get(EXPOSURE_STATUS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<ExposureStatus>(&raw) {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        name = "status_store.corrupt_blob",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        error = %e,
                        message = "Persisted exposure status did not parse, resetting to monitoring"
                    );
                    ExposureStatus::default()
                }
            },
            Ok(None) => ExposureStatus::default(),
            Err(e) => {
                tracing::warn!(
                    name = "status_store.load_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Could not read persisted exposure status, resetting to monitoring"
                );
                ExposureStatus::default()
            }
        };
        let mut current = self.current.write().await;
        *current = restored.clone();
        restored
    }

    pub async fn current(&self) -> ExposureStatus {
        self.current.read().await.clone()
    }

    /// Replace the in-memory status and persist it immediately. The write
    /// is best-effort: a storage failure is logged but the in-memory state
    /// still advances, so a transient storage outage cannot wedge a check.
    pub async fn replace(&self, next: ExposureStatus) {
        {
            let mut current = self.current.write().await;
            *current = next.clone();
        }
        match serde_json::to_string(&next) {
            Ok(raw) => {
                if let Err(e) = self.store.set(EXPOSURE_STATUS_KEY, &raw).await {
                    tracing::warn!(
                        name = "status_store.persist_failed",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        error = %e,
                        message = "Failed to persist exposure status"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    name = "status_store.encode_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Failed to encode exposure status"
                );
            }
        }
    }

    pub async fn last_exposure_timestamp(&self) -> Option<i64> {
        match self.store.get(LAST_EXPOSURE_TIMESTAMP_KEY).await {
            Ok(raw) => raw.and_then(|s| s.parse::<i64>().ok()),
            Err(e) => {
                tracing::warn!(
                    name = "status_store.last_exposure_read_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Could not read last exposure timestamp"
                );
                None
            }
        }
    }

    /// Advance the durable last-exposure timestamp, monotonically: a weaker
    /// or older summary never moves it backward.
    pub async fn record_last_exposure(&self, timestamp_ms: i64) {
        let known = self.last_exposure_timestamp().await.unwrap_or(i64::MIN);
        if timestamp_ms <= known {
            return;
        }
        if let Err(e) = self
            .store
            .set(LAST_EXPOSURE_TIMESTAMP_KEY, &timestamp_ms.to_string())
            .await
        {
            tracing::warn!(
                name = "status_store.last_exposure_write_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to persist last exposure timestamp"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{DurationUnit, ExposureSummary};
    use crate::testutil::MemoryStore;

    #[tokio::test]
    async fn load_falls_back_to_monitoring_on_corrupt_blob() {
        let store = Arc::new(MemoryStore::default());
        store
            .set(EXPOSURE_STATUS_KEY, "{not json")
            .await
            .unwrap();
        let status_store = StatusStore::new(store);
        assert_eq!(status_store.load().await, ExposureStatus::default());
    }

    #[tokio::test]
    async fn replace_writes_through() {
        let store = Arc::new(MemoryStore::default());
        let status_store = StatusStore::new(store.clone());
        let next = ExposureStatus::Exposed {
            summary: ExposureSummary {
                last_exposure_at: 42,
                attenuation_durations: vec![20, 0, 0],
                duration_unit: DurationUnit::Minutes,
            },
            notification_sent: false,
            last_checked: None,
        };
        status_store.replace(next.clone()).await;

        let raw = store.get(EXPOSURE_STATUS_KEY).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<ExposureStatus>(&raw).unwrap(), next);
        assert_eq!(status_store.current().await, next);
    }

    #[tokio::test]
    async fn last_exposure_timestamp_is_monotonic() {
        let store = Arc::new(MemoryStore::default());
        let status_store = StatusStore::new(store);
        status_store.record_last_exposure(1_000).await;
        status_store.record_last_exposure(500).await;
        assert_eq!(status_store.last_exposure_timestamp().await, Some(1_000));
        status_store.record_last_exposure(2_000).await;
        assert_eq!(status_store.last_exposure_timestamp().await, Some(2_000));
    }
}
