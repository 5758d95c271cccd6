//! Collaborator contracts consumed by the service.
//!
//! The platform exposure-matching capability, the diagnosis-server backend
//! and the notification presenter all live outside this crate; they are
//! specified here at their interface only. Implementations are expected to
//! be cheap to clone behind `Arc<dyn _>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ExposureConfiguration;
use crate::error::{BackendError, CapabilityError};
use crate::status::ExposureSummary;
use crate::utils::Period;

/// Opaque handle to a downloaded diagnosis-key batch file, as produced by
/// the backend client and consumed by the matching capability. The service
/// never looks inside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFileHandle(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryExposureKey {
    pub key_data: String,
    pub rolling_start_interval_number: u32,
    pub rolling_period: u32,
    pub transmission_risk_level: u8,
}

/// Credential set returned by one-time-code redemption and required for
/// every subsequent key upload. Stored once in the secure store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    pub server_public_key: String,
    pub client_public_key: String,
    pub client_private_key: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContagiousDateType {
    SymptomOnsetDate,
    TestDate,
    NoDate,
}

/// User-supplied context for how far back submitted keys are contagious.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContagiousDateInfo {
    pub date_type: ContagiousDateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatcherStatus {
    Active,
    Disabled,
    Unauthorized,
    Unknown,
}

/// The platform's exposure-matching capability (the native EN framework).
#[async_trait]
pub trait ExposureMatcher: Send + Sync {
    async fn start(&self) -> Result<(), CapabilityError>;

    async fn get_status(&self) -> Result<MatcherStatus, CapabilityError>;

    /// Summaries the platform already computed asynchronously, if any.
    /// `Some(non-empty)` short-circuits the key-fetch pipeline.
    async fn get_pending_exposure_summary(
        &self,
    ) -> Result<Option<Vec<ExposureSummary>>, CapabilityError>;

    /// Run matching over the given key batches with the given configuration.
    async fn detect_exposure(
        &self,
        configuration: &ExposureConfiguration,
        key_files: &[KeyFileHandle],
    ) -> Result<Vec<ExposureSummary>, CapabilityError>;

    /// The device's own temporary exposure keys, for upload after diagnosis.
    async fn get_temporary_exposure_key_history(
        &self,
    ) -> Result<Vec<TemporaryExposureKey>, CapabilityError>;
}

/// The diagnosis-server backend client.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn claim_one_time_code(&self, code: &str) -> Result<CredentialSet, BackendError>;

    /// Download the published key batch for one period.
    async fn retrieve_diagnosis_keys(&self, period: Period) -> Result<KeyFileHandle, BackendError>;

    async fn report_diagnosis_keys(
        &self,
        credentials: &CredentialSet,
        keys: &[TemporaryExposureKey],
        contagious: &ContagiousDateInfo,
    ) -> Result<(), BackendError>;

    /// The authoritative exposure configuration, as published JSON. Parsing
    /// and schema validation happen in the resolver, not here.
    async fn get_exposure_configuration(&self) -> Result<serde_json::Value, BackendError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
}

/// Push-notification presenter. Presentation and localization are outside
/// this crate; delivery failures are the presenter's problem.
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn present_local_notification(&self, notification: LocalNotification);
}
