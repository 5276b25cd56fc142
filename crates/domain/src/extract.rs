//! History extracts: presentation-ready data points built from intervals.
//!
//! Two modes are supported:
//! - [`DataType::Text`] emits one point per interval in range, a compressed
//!   change log.
//! - [`DataType::Number`] samples the series every `interval` starting at
//!   `range_start` (inclusive of `range_end`), carrying the last known value
//!   forward across gaps.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::interval::{Interval, IntervalPage, SkippedShard};
use crate::observation::SeriesKey;
use crate::time::Timestamp;

/// Sampling interval used by number extracts when the caller gives none.
#[must_use]
pub fn default_interval() -> TimeDelta {
    TimeDelta::minutes(5)
}

/// How the values of an extract are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Text,
    Number,
}

impl FromStr for DataType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            other => Err(ValidationError::InvalidDataType(other.to_string())),
        }
    }
}

/// Parameters of one extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub series: SeriesKey,
    pub range_start: Timestamp,
    pub range_end: Timestamp,
    pub interval: Option<TimeDelta>,
    pub data_type: DataType,
    pub max_row_count: usize,
    /// Emitted for samples taken before any value is known.
    pub fill_value: Option<String>,
}

impl ExtractRequest {
    /// Check the caller contract.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for empty identifiers, an inverted
    /// range, an interval combined with [`DataType::Text`] or a
    /// non-positive interval.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.series.validate()?;
        if self.range_start > self.range_end {
            return Err(ValidationError::InvertedRange);
        }
        match (self.data_type, self.interval) {
            (DataType::Text, Some(_)) => Err(ValidationError::IntervalWithText),
            (DataType::Number, Some(interval)) if interval <= TimeDelta::zero() => {
                Err(ValidationError::NonPositiveInterval)
            }
            _ => Ok(()),
        }
    }
}

/// A sampled value: numeric when it parses as one, text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPointValue {
    Number(f64),
    Text(String),
}

impl DataPointValue {
    /// Interpret a stored value for a number extract.
    #[must_use]
    pub fn parse_number(value: &str) -> Self {
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map_or_else(|| Self::Text(value.to_string()), Self::Number)
    }
}

impl fmt::Display for DataPointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => number.fmt(f),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// One point of an extract; `value` is `None` when nothing is known yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: Timestamp,
    pub value: Option<DataPointValue>,
}

/// The result of an extract query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extract {
    pub component_uid: String,
    pub status_uid: String,
    /// Number of source intervals consulted.
    pub entity_count: usize,
    pub data_points: Vec<DataPoint>,
    /// Shards that could not be read completely.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_shards: Vec<SkippedShard>,
}

/// Build an extract from the intervals of `request.series` in range,
/// ordered by `range_start`.
#[must_use]
pub fn build_extract(request: &ExtractRequest, page: IntervalPage) -> Extract {
    let data_points = match request.data_type {
        DataType::Text => text_points(&page.intervals, request),
        DataType::Number => number_points(&page.intervals, request),
    };

    Extract {
        component_uid: request.series.component_uid.clone(),
        status_uid: request.series.status_uid.clone(),
        entity_count: page.intervals.len(),
        data_points,
        skipped_shards: page.skipped_shards,
    }
}

fn text_points(intervals: &[Interval], request: &ExtractRequest) -> Vec<DataPoint> {
    let mut points = Vec::new();

    for interval in intervals {
        if points.len() >= request.max_row_count {
            break;
        }

        // A value that started earlier still holds when the range begins.
        let mut timestamp = interval.range_start.max(request.range_start);
        let reaches_end = interval.range_end >= request.range_end;
        if reaches_end {
            timestamp = request.range_end;
        }

        points.push(DataPoint {
            timestamp,
            value: Some(DataPointValue::Text(interval.value.clone())),
        });

        if reaches_end {
            break;
        }
    }

    points
}

fn number_points(intervals: &[Interval], request: &ExtractRequest) -> Vec<DataPoint> {
    let step = request.interval.unwrap_or_else(default_interval);
    if intervals.is_empty() || step <= TimeDelta::zero() {
        return Vec::new();
    }

    let fill = request.fill_value.clone().map(DataPointValue::Text);
    let mut points = Vec::new();
    let mut carried: Option<DataPointValue> = None;
    // Index of the first interval starting after the current sample.
    let mut upcoming = 0;
    let mut sample = request.range_start;

    while sample <= request.range_end && points.len() < request.max_row_count {
        while upcoming < intervals.len() && intervals[upcoming].range_start <= sample {
            upcoming += 1;
        }

        let covering = upcoming
            .checked_sub(1)
            .map(|index| &intervals[index])
            .filter(|interval| interval.contains(sample));

        if let Some(interval) = covering {
            carried = Some(DataPointValue::parse_number(&interval.value));
        }

        points.push(DataPoint {
            timestamp: sample,
            value: carried.clone().or_else(|| fill.clone()),
        });

        match sample.checked_add_signed(step) {
            Some(next) => sample = next,
            None => break,
        }
    }

    points
}
