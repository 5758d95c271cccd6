//! The persisted exposure-risk state and the evidence it carries.
//!
//! `ExposureStatus` is a true sum type: the variant tag alone decides which
//! fields exist, so a `Monitoring` value cannot carry submission bookkeeping
//! and an `Exposed` value always has its summary. The serde encoding is the
//! tagged camelCase JSON layout already present in deployed key/value
//! stores, so a blob written by an older client parses unchanged.

use serde::{Deserialize, Serialize};

use crate::utils::Period;

/// Checkpoint of the last successfully processed check: the wall-clock
/// timestamp (unix ms) and the newest period whose key batch was handed to
/// the matching capability. The period drives incremental fetch bounds and
/// is monotonically non-decreasing across successful checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastChecked {
    pub timestamp: i64,
    pub period: Period,
}

/// Unit of the attenuation-bucket durations reported by the matching
/// capability. iOS reports seconds, Android reports minutes; filtering
/// normalizes to minutes before comparing against the configured threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationUnit {
    Seconds,
    #[default]
    Minutes,
}

/// The matching capability's risk evidence for one detection run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureSummary {
    /// When the most recent qualifying contact happened (unix ms).
    pub last_exposure_at: i64,
    /// Cumulative contact duration per attenuation bucket, ordered
    /// immediate / near / far.
    pub attenuation_durations: Vec<u32>,
    #[serde(default)]
    pub duration_unit: DurationUnit,
}

impl ExposureSummary {
    /// Combined immediate + near contact duration in whole minutes.
    /// Second-based inputs are divided by 60 and rounded to the nearest
    /// minute so both platforms filter identically.
    pub fn exposure_minutes(&self) -> u32 {
        let immediate = self.attenuation_durations.first().copied().unwrap_or(0);
        let near = self.attenuation_durations.get(1).copied().unwrap_or(0);
        let combined = immediate.saturating_add(near);
        match self.duration_unit {
            DurationUnit::Seconds => (f64::from(combined) / 60.0).round() as u32,
            DurationUnit::Minutes => combined,
        }
    }
}

/// The single persisted source of truth for the device's risk state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExposureStatus {
    /// Default rest state: no qualifying exposure, no active diagnosis.
    #[serde(rename_all = "camelCase")]
    Monitoring {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_checked: Option<LastChecked>,
    },
    /// At least one qualifying exposure detected and not yet aged out.
    #[serde(rename_all = "camelCase")]
    Exposed {
        summary: ExposureSummary,
        notification_sent: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_checked: Option<LastChecked>,
    },
    /// Verified diagnosis inside (or just past) a fixed 14-day
    /// key-submission cycle. `cycle_ends_at` is fixed at diagnosis time and
    /// never recomputed.
    #[serde(rename_all = "camelCase")]
    Diagnosed {
        needs_submission: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        submission_last_completed_at: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upload_reminder_last_sent_at: Option<i64>,
        cycle_starts_at: i64,
        cycle_ends_at: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_checked: Option<LastChecked>,
    },
}

impl Default for ExposureStatus {
    fn default() -> Self {
        ExposureStatus::Monitoring { last_checked: None }
    }
}

impl ExposureStatus {
    pub fn last_checked(&self) -> Option<LastChecked> {
        match self {
            ExposureStatus::Monitoring { last_checked }
            | ExposureStatus::Exposed { last_checked, .. }
            | ExposureStatus::Diagnosed { last_checked, .. } => *last_checked,
        }
    }

    pub(crate) fn set_last_checked(&mut self, checkpoint: LastChecked) {
        match self {
            ExposureStatus::Monitoring { last_checked }
            | ExposureStatus::Exposed { last_checked, .. }
            | ExposureStatus::Diagnosed { last_checked, .. } => *last_checked = Some(checkpoint),
        }
    }

    /// Variant tag for structured log events.
    pub fn variant(&self) -> &'static str {
        match self {
            ExposureStatus::Monitoring { .. } => "monitoring",
            ExposureStatus::Exposed { .. } => "exposed",
            ExposureStatus::Diagnosed { .. } => "diagnosed",
        }
    }
}
