//! Exposure-matching configuration: schema, validation, and the three-tier
//! resolution chain (remote fetch → last-known-good cache → bundled
//! default). Resolution never fails; a usable configuration always comes
//! back.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::bridge::Backend;
use crate::error::ConfigFetchError;
use crate::storage::{EXPOSURE_CONFIGURATION_KEY, KeyValueStore};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureConfiguration {
    /// Combined immediate+near contact minutes below which a summary is not
    /// considered an exposure.
    pub minimum_exposure_duration_minutes: u32,
    pub minimum_risk_score: u8,
    /// Two attenuation cutoffs (dB) splitting contact time into the
    /// immediate / near / far buckets.
    pub attenuation_duration_thresholds: Vec<u8>,
    pub attenuation_level_values: Vec<u8>,
    pub days_since_last_exposure_level_values: Vec<u8>,
    pub duration_level_values: Vec<u8>,
    pub transmission_risk_level_values: Vec<u8>,
}

impl ExposureConfiguration {
    /// Schema validation applied to every remotely fetched configuration.
    pub fn validate(&self) -> Result<(), ConfigFetchError> {
        if self.minimum_exposure_duration_minutes == 0 {
            return Err(ConfigFetchError::Schema(
                "minimumExposureDurationMinutes must be > 0".into(),
            ));
        }
        if self.attenuation_duration_thresholds.len() != 2 {
            return Err(ConfigFetchError::Schema(
                "attenuationDurationThresholds must have exactly 2 entries".into(),
            ));
        }
        let level_arrays = [
            ("attenuationLevelValues", &self.attenuation_level_values),
            (
                "daysSinceLastExposureLevelValues",
                &self.days_since_last_exposure_level_values,
            ),
            ("durationLevelValues", &self.duration_level_values),
            (
                "transmissionRiskLevelValues",
                &self.transmission_risk_level_values,
            ),
        ];
        for (field, values) in level_arrays {
            if values.len() != 8 {
                return Err(ConfigFetchError::Schema(format!(
                    "{field} must have exactly 8 entries"
                )));
            }
            if values.iter().any(|v| *v > 8) {
                return Err(ConfigFetchError::Schema(format!(
                    "{field} entries must be in 0..=8"
                )));
            }
        }
        Ok(())
    }
}

/// Bundled fallback used when neither the backend nor the cache can supply
/// a configuration.
pub static DEFAULT_CONFIGURATION: Lazy<ExposureConfiguration> = Lazy::new(|| {
    ExposureConfiguration {
        minimum_exposure_duration_minutes: 15,
        minimum_risk_score: 0,
        attenuation_duration_thresholds: vec![50, 62],
        attenuation_level_values: vec![0, 0, 1, 1, 1, 1, 1, 1],
        days_since_last_exposure_level_values: vec![1; 8],
        duration_level_values: vec![0, 0, 0, 1, 1, 1, 1, 1],
        transmission_risk_level_values: vec![1; 8],
    }
});

pub struct ConfigurationResolver {
    backend: Arc<dyn Backend>,
    store: Arc<dyn KeyValueStore>,
}

impl ConfigurationResolver {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { backend, store }
    }

    /// Resolve a usable configuration, first success wins: validated remote
    /// fetch (cached on success), then the last cached copy, then the
    /// bundled default. Infallible by design.
    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self) -> ExposureConfiguration {
        match self.fetch_remote().await {
            Ok(configuration) => {
                self.cache(&configuration).await;
                return configuration;
            }
            // Each failure mode gets its own event so operators can tell a
            // flaky network from a bad publish.
            Err(ConfigFetchError::Fetch(e)) => {
                tracing::warn!(
                    name = "config.remote_fetch_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Remote configuration fetch failed, falling back"
                );
            }
            Err(ConfigFetchError::Parse(e)) => {
                tracing::warn!(
                    name = "config.remote_parse_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Remote configuration did not parse, falling back"
                );
            }
            Err(ConfigFetchError::Schema(e)) => {
                tracing::warn!(
                    name = "config.remote_schema_invalid",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Remote configuration failed schema validation, falling back"
                );
            }
        }

        if let Some(cached) = self.cached().await {
            tracing::info!(
                name = "config.using_cached",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Using last cached exposure configuration"
            );
            return cached;
        }

        tracing::info!(
            name = "config.using_default",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Using bundled default exposure configuration"
        );
        DEFAULT_CONFIGURATION.clone()
    }

    async fn fetch_remote(&self) -> Result<ExposureConfiguration, ConfigFetchError> {
        let raw = self.backend.get_exposure_configuration().await?;
        let configuration: ExposureConfiguration =
            serde_json::from_value(raw).map_err(|e| ConfigFetchError::Parse(e.to_string()))?;
        configuration.validate()?;
        Ok(configuration)
    }

    async fn cache(&self, configuration: &ExposureConfiguration) {
        let raw = match serde_json::to_string(configuration) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        if let Err(e) = self.store.set(EXPOSURE_CONFIGURATION_KEY, &raw).await {
            tracing::warn!(
                name = "config.cache_write_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to cache exposure configuration"
            );
        }
    }

    async fn cached(&self) -> Option<ExposureConfiguration> {
        let raw = self.store.get(EXPOSURE_CONFIGURATION_KEY).await.ok()??;
        serde_json::from_str(&raw).ok()
    }
}
