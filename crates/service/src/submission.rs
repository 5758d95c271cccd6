//! The diagnosis key-submission workflow: one-time-code redemption, the
//! per-UTC-day submission credit, and the key upload itself.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::bridge::{Backend, ContagiousDateInfo, CredentialSet, ExposureMatcher};
use crate::error::SubmissionError;
use crate::machine::{StatusMachine, cycle_has_ended};
use crate::status::ExposureStatus;
use crate::storage::{SUBMISSION_CREDENTIALS_KEY, SecureStore};
use crate::utils::{days_between_utc, from_timestamp_ms};

/// Whether a key submission is currently due.
///
/// At most one submission is credited per UTC calendar day: after a
/// completed submission the flag flips back only once the UTC date rolls
/// over, never mid-day. Outside an open `Diagnosed` cycle the answer is
/// always no.
pub fn needs_submission(status: &ExposureStatus, now: OffsetDateTime) -> bool {
    let ExposureStatus::Diagnosed {
        cycle_ends_at,
        submission_last_completed_at,
        ..
    } = status
    else {
        return false;
    };
    if cycle_has_ended(*cycle_ends_at, now) {
        return false;
    }
    match submission_last_completed_at {
        None => true,
        Some(last) => days_between_utc(from_timestamp_ms(*last), now) > 0,
    }
}

pub struct SubmissionManager {
    backend: Arc<dyn Backend>,
    matcher: Arc<dyn ExposureMatcher>,
    secure_store: Arc<dyn SecureStore>,
}

impl SubmissionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        matcher: Arc<dyn ExposureMatcher>,
        secure_store: Arc<dyn SecureStore>,
    ) -> Self {
        Self {
            backend,
            matcher,
            secure_store,
        }
    }

    /// Redeem a verified one-time code and open a fresh submission cycle.
    ///
    /// Storing the credential set is a best-effort side write: a secure
    /// store failure is logged but must not abort the diagnosis itself.
    #[tracing::instrument(skip_all)]
    pub async fn redeem_one_time_code(
        &self,
        machine: &StatusMachine,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<ExposureStatus, SubmissionError> {
        let credentials = self.backend.claim_one_time_code(code).await?;

        match serde_json::to_string(&credentials) {
            Ok(raw) => {
                if let Err(e) = self.secure_store.set(SUBMISSION_CREDENTIALS_KEY, &raw).await {
                    tracing::warn!(
                        name = "submission.credential_store_failed",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        error = %e,
                        message = "Failed to store submission credentials"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    name = "submission.credential_encode_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Failed to encode submission credentials"
                );
            }
        }

        Ok(machine.transition_diagnosed(now).await)
    }

    /// Read the device's temporary exposure keys and upload them.
    ///
    /// A missing credential set is fatal and user-visible ("bad
    /// certificate"); a key-history read failure is a distinct, retryable
    /// error. Zero available keys is normal early in a diagnosis and skips
    /// the upload without error. Completion is recorded whether or not any
    /// keys were actually uploaded.
    #[tracing::instrument(skip_all)]
    pub async fn fetch_and_submit_keys(
        &self,
        machine: &StatusMachine,
        contagious: &ContagiousDateInfo,
        now: OffsetDateTime,
    ) -> Result<(), SubmissionError> {
        let credentials = self.stored_credentials().await?;

        let keys = self
            .matcher
            .get_temporary_exposure_key_history()
            .await
            .map_err(SubmissionError::KeyHistory)?;

        if keys.is_empty() {
            tracing::info!(
                name = "submission.no_keys_available",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "No temporary exposure keys available yet, skipping upload"
            );
        } else {
            self.backend
                .report_diagnosis_keys(&credentials, &keys, contagious)
                .await?;
            tracing::info!(
                name = "submission.keys_uploaded",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                count = keys.len(),
                message = "Uploaded temporary exposure keys"
            );
        }

        machine.record_key_submission(now).await;
        Ok(())
    }

    async fn stored_credentials(&self) -> Result<CredentialSet, SubmissionError> {
        let raw = self
            .secure_store
            .get(SUBMISSION_CREDENTIALS_KEY)
            .await
            .ok()
            .flatten()
            .ok_or(SubmissionError::MissingCredential)?;
        serde_json::from_str(&raw).map_err(|_| SubmissionError::MissingCredential)
    }
}
