//! Time and timestamp helpers.

use chrono::{DateTime, SubsecRound, Utc};

/// UTC timestamp used for observations, interval bounds and data points.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Drop sub-millisecond precision, which the on-disk format cannot hold.
#[must_use]
pub fn truncate_to_millis(timestamp: Timestamp) -> Timestamp {
    timestamp.trunc_subsecs(3)
}
