//! Day-shard addressing.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::time::Timestamp;
use crate::token::DayOffset;

/// The UTC calendar day a shard covers, rendered as `yyyy/mm/dd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayPath(NaiveDate);

impl DayPath {
    /// The day containing `timestamp`.
    #[must_use]
    pub fn of(timestamp: Timestamp) -> Self {
        Self(timestamp.date_naive())
    }

    /// Build from calendar fields; `None` for an impossible date.
    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parse the three directory names of a shard path.
    #[must_use]
    pub fn parse(year: &str, month: &str, day: &str) -> Option<Self> {
        if month.len() != 2 || day.len() != 2 {
            return None;
        }
        Self::from_ymd(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
    }

    #[must_use]
    pub fn year(self) -> i32 {
        self.0.year()
    }

    #[must_use]
    pub fn month(self) -> u32 {
        self.0.month()
    }

    #[must_use]
    pub fn day(self) -> u32 {
        self.0.day()
    }

    /// Directory names, outermost first: `["2024", "03", "01"]`.
    #[must_use]
    pub fn segments(self) -> [String; 3] {
        [
            self.year().to_string(),
            format!("{:02}", self.month()),
            format!("{:02}", self.day()),
        ]
    }

    /// Midnight (UTC) at the start of this day.
    #[must_use]
    pub fn start(self) -> Timestamp {
        self.0.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// The last representable instant of this day.
    #[must_use]
    pub fn end(self) -> Timestamp {
        self.at(DayOffset::LAST)
    }

    /// Absolute instant of an offset stored in this shard.
    #[must_use]
    pub fn at(self, offset: DayOffset) -> Timestamp {
        self.start() + offset.to_duration()
    }

    /// Whether the whole day lies inside the optional bounds.
    #[must_use]
    pub fn is_within(self, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
        start.is_none_or(|start| start <= self.start()) && end.is_none_or(|end| end >= self.end())
    }

    /// Whether any instant of the day lies inside the optional bounds.
    #[must_use]
    pub fn overlaps(self, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
        start.is_none_or(|start| start <= self.end()) && end.is_none_or(|end| end >= self.start())
    }
}

impl fmt::Display for DayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}/{:02}", self.year(), self.month(), self.day())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(d: u32, h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    #[test]
    fn should_render_zero_padded_path() {
        let day = DayPath::of(ts(1, 10, 0));
        assert_eq!(day.to_string(), "2024/03/01");
        assert_eq!(day.segments(), ["2024", "03", "01"]);
    }

    #[test]
    fn should_parse_directory_names() {
        assert_eq!(DayPath::parse("2024", "03", "01"), DayPath::from_ymd(2024, 3, 1));
        assert_eq!(DayPath::parse("2024", "3", "01"), None);
        assert_eq!(DayPath::parse("2024", "02", "30"), None);
        assert_eq!(DayPath::parse("year", "02", "01"), None);
    }

    #[test]
    fn should_resolve_offsets_to_absolute_instants() {
        let day = DayPath::of(ts(5, 0, 0));
        let offset = DayOffset::of(ts(5, 13, 45));
        assert_eq!(day.at(offset), ts(5, 13, 45));
        assert_eq!(day.start(), ts(5, 0, 0));
    }

    #[test]
    fn should_detect_days_fully_inside_bounds() {
        let day = DayPath::of(ts(2, 12, 0));
        assert!(day.is_within(None, None));
        assert!(day.is_within(Some(ts(2, 0, 0)), Some(ts(3, 0, 0))));
        assert!(!day.is_within(Some(ts(2, 0, 1)), None));
        assert!(!day.is_within(None, Some(ts(2, 23, 59))));
    }

    #[test]
    fn should_detect_overlapping_days() {
        let day = DayPath::of(ts(2, 12, 0));
        assert!(day.overlaps(Some(ts(2, 23, 59)), None));
        assert!(day.overlaps(None, Some(ts(2, 0, 0))));
        assert!(!day.overlaps(Some(ts(3, 0, 0)), None));
        assert!(!day.overlaps(None, Some(ts(1, 23, 59))));
    }
}
