//! Normalization of reported values before they reach storage.
//!
//! Sensors report readings with more precision than is useful to keep. Rounding
//! them makes consecutive readings compare equal, so the repository can extend
//! an interval instead of appending a new one.

use std::collections::BTreeMap;

use hubhist_domain::observation::SeriesKey;

/// Rounds numeric values to a configured number of decimals.
///
/// Rules are keyed by status uid (`temperature.value`) or by the full series
/// (`livingroom.sensor.temperature.value`); the series rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormatter {
    decimals: BTreeMap<String, u32>,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self::new([
            ("temperature.value".to_string(), 1),
            ("humidity.value".to_string(), 0),
        ])
    }
}

impl ValueFormatter {
    #[must_use]
    pub fn new(decimals: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self {
            decimals: decimals.into_iter().collect(),
        }
    }

    /// A formatter that leaves every value untouched.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new([])
    }

    /// Number of decimals configured for a series, if any.
    #[must_use]
    pub fn decimals_for(&self, series: &SeriesKey) -> Option<u32> {
        self.decimals
            .get(&series.to_string())
            .or_else(|| self.decimals.get(&series.status_uid))
            .copied()
    }

    /// Format `value` for `series`. Non-numeric values pass through unchanged.
    #[must_use]
    pub fn format(&self, series: &SeriesKey, value: &str) -> String {
        let Some(decimals) = self.decimals_for(series) else {
            return value.to_string();
        };
        match value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => round(number, decimals),
            _ => value.to_string(),
        }
    }
}

fn round(number: f64, decimals: u32) -> String {
    let precision = decimals as usize;
    let formatted = format!("{number:.precision$}");
    // `-0.0` after rounding is still zero.
    if formatted.starts_with('-') && formatted[1..].chars().all(|c| c == '0' || c == '.') {
        return formatted[1..].to_string();
    }
    formatted
}
