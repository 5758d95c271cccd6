//! Period arithmetic and calendar-day helpers shared across the crate.
//!
//! Two different day counts exist on purpose: exposure aging compares
//! device-local calendar days while the submission cycle compares UTC
//! calendar days. The two bases are historical behaviour and must not be
//! unified.

use time::{OffsetDateTime, UtcOffset};

/// Index of a fixed 24-hour window since the unix epoch; the unit of
/// diagnosis-key batch publication and of fetch checkpointing.
pub type Period = u64;

pub const SECONDS_PER_PERIOD: i64 = 24 * 60 * 60;

/// Length of both the exposure-relevance window and the key-submission
/// cycle, in days (and, equivalently, in periods).
pub const EXPOSURE_NOTIFICATION_CYCLE: i64 = 14;

pub fn current_period(now: OffsetDateTime) -> Period {
    (now.unix_timestamp() / SECONDS_PER_PERIOD).max(0) as Period
}

/// Wall-clock timestamps are persisted as unix milliseconds.
pub fn timestamp_ms(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_timestamp_ms(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Whole calendar days from `from` to `to`, both viewed in UTC.
/// Negative when `to` is on an earlier UTC date than `from`.
pub fn days_between_utc(from: OffsetDateTime, to: OffsetDateTime) -> i64 {
    let from_day = from.to_offset(UtcOffset::UTC).date().to_julian_day();
    let to_day = to.to_offset(UtcOffset::UTC).date().to_julian_day();
    i64::from(to_day - from_day)
}

/// Whole calendar days from `from` to `to`, both viewed at the given
/// device-local offset.
pub fn days_between(from: OffsetDateTime, to: OffsetDateTime, offset: UtcOffset) -> i64 {
    let from_day = from.to_offset(offset).date().to_julian_day();
    let to_day = to.to_offset(offset).date().to_julian_day();
    i64::from(to_day - from_day)
}

/// Resolve the device's UTC offset once at service construction. Falls back
/// to UTC when the platform cannot report an offset (sound: the fallback
/// only widens the aging window by at most one day in the user's favour).
pub fn device_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}
