//! Intervals, the persisted unit of history, and the query shapes used to
//! read them back.

use serde::{Deserialize, Serialize};

use crate::day_path::DayPath;
use crate::error::ValidationError;
use crate::observation::SeriesKey;
use crate::time::Timestamp;

/// A value held by a series from `range_start` to `range_end`, both inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub range_start: Timestamp,
    pub range_end: Timestamp,
    pub value: String,
}

impl Interval {
    /// An empty interval (`begin == end`) at a single instant.
    #[must_use]
    pub fn at(timestamp: Timestamp, value: impl Into<String>) -> Self {
        Self {
            range_start: timestamp,
            range_end: timestamp,
            value: value.into(),
        }
    }

    /// Whether `[range_start, range_end]` intersects `[start, end]`.
    #[must_use]
    pub fn intersects(&self, start: Timestamp, end: Timestamp) -> bool {
        self.range_start <= end && self.range_end >= start
    }

    /// Whether `timestamp` lies inside the interval.
    #[must_use]
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.range_start <= timestamp && timestamp <= self.range_end
    }
}

/// What an update did to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// A new interval was appended.
    Appended,
    /// The last interval's end was patched in place.
    Extended,
    /// The observation was not after the last recorded instant and was dropped.
    Stale,
    /// History is disabled or the series is blacklisted; storage untouched.
    Skipped,
}

/// A shard that could not be read completely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedShard {
    pub series: SeriesKey,
    pub day: String,
    pub reason: String,
}

impl SkippedShard {
    #[must_use]
    pub fn new(series: &SeriesKey, day: DayPath, reason: impl ToString) -> Self {
        Self {
            series: series.clone(),
            day: day.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Intervals of one series inside a query range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalPage {
    pub intervals: Vec<Interval>,
    pub skipped_shards: Vec<SkippedShard>,
}

/// Number of intervals matching a [`SeriesFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCount {
    pub row_count: u64,
    /// Shards that could not be read completely; their readable prefix is
    /// counted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_shards: Vec<SkippedShard>,
}

/// Range query over a single series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalQuery {
    pub series: SeriesKey,
    pub range_start: Timestamp,
    pub range_end: Timestamp,
    pub max_count: usize,
}

impl IntervalQuery {
    /// Check identifiers and range order.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for empty identifiers or an inverted range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.series.validate()?;
        if self.range_start > self.range_end {
            return Err(ValidationError::InvertedRange);
        }
        Ok(())
    }
}

/// Optional filters shared by delete and row count. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesFilter {
    pub component_uid: Option<String>,
    pub status_uid: Option<String>,
    pub range_start: Option<Timestamp>,
    pub range_end: Option<Timestamp>,
}

impl SeriesFilter {
    /// Every shard of every status of one component.
    #[must_use]
    pub fn component(component_uid: impl Into<String>) -> Self {
        Self {
            component_uid: Some(component_uid.into()),
            ..Self::default()
        }
    }

    /// Every shard of one series.
    #[must_use]
    pub fn series(series: &SeriesKey) -> Self {
        Self {
            component_uid: Some(series.component_uid.clone()),
            status_uid: Some(series.status_uid.clone()),
            ..Self::default()
        }
    }

    /// Restrict to a time range.
    #[must_use]
    pub fn between(mut self, range_start: Timestamp, range_end: Timestamp) -> Self {
        self.range_start = Some(range_start);
        self.range_end = Some(range_end);
        self
    }

    /// Blank identifiers behave as absent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.component_uid = self.component_uid.filter(|uid| !uid.trim().is_empty());
        self.status_uid = self.status_uid.filter(|uid| !uid.trim().is_empty());
        self
    }

    /// Check filter consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvertedRange`] when both bounds are set and
    /// inverted, [`ValidationError::StatusWithoutComponent`] when a status is
    /// given without its component.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(start), Some(end)) = (self.range_start, self.range_end)
            && start > end
        {
            return Err(ValidationError::InvertedRange);
        }
        if self.status_uid.is_some() && self.component_uid.is_none() {
            return Err(ValidationError::StatusWithoutComponent);
        }
        Ok(())
    }

    /// Whether an interval passes the optional range bounds.
    #[must_use]
    pub fn matches(&self, interval: &Interval) -> bool {
        self.range_start
            .is_none_or(|start| interval.range_end >= start)
            && self.range_end.is_none_or(|end| interval.range_start <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn t(hours: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::hours(hours)
    }

    fn interval(start: i64, end: i64) -> Interval {
        Interval {
            range_start: t(start),
            range_end: t(end),
            value: "x".to_string(),
        }
    }

    #[test]
    fn should_intersect_when_ranges_touch() {
        assert!(interval(0, 2).intersects(t(2), t(3)));
        assert!(interval(2, 3).intersects(t(0), t(2)));
        assert!(!interval(0, 1).intersects(t(2), t(3)));
    }

    #[test]
    fn should_contain_both_ends() {
        let iv = interval(1, 2);
        assert!(iv.contains(t(1)));
        assert!(iv.contains(t(2)));
        assert!(!iv.contains(t(3)));
    }

    #[test]
    fn should_reject_inverted_query_range() {
        let query = IntervalQuery {
            series: SeriesKey::new("c1", "s1").unwrap(),
            range_start: t(2),
            range_end: t(1),
            max_count: 10,
        };
        assert_eq!(query.validate(), Err(ValidationError::InvertedRange));
    }

    #[test]
    fn should_reject_status_without_component() {
        let filter = SeriesFilter {
            status_uid: Some("s1".to_string()),
            ..SeriesFilter::default()
        };
        assert_eq!(
            filter.validate(),
            Err(ValidationError::StatusWithoutComponent)
        );
    }

    #[test]
    fn should_treat_blank_identifiers_as_absent() {
        let filter = SeriesFilter {
            component_uid: Some(String::new()),
            status_uid: Some(" ".to_string()),
            ..SeriesFilter::default()
        }
        .normalized();
        assert_eq!(filter, SeriesFilter::default());
    }

    #[test]
    fn should_match_intervals_with_open_bounds() {
        let filter = SeriesFilter::component("c1");
        assert!(filter.matches(&interval(0, 1)));

        let bounded = SeriesFilter::component("c1").between(t(2), t(4));
        assert!(bounded.matches(&interval(1, 2)));
        assert!(!bounded.matches(&interval(5, 6)));
    }
}
