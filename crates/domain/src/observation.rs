//! Observations: the raw `(component, status, value, timestamp)` facts
//! reported by the hub, and the series they belong to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::Timestamp;

/// Identifies one history series: a status of a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub component_uid: String,
    pub status_uid: String,
}

impl SeriesKey {
    /// Build a key, rejecting empty identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyComponentUid`] or
    /// [`ValidationError::EmptyStatusUid`].
    pub fn new(
        component_uid: impl Into<String>,
        status_uid: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let key = Self {
            component_uid: component_uid.into(),
            status_uid: status_uid.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Check that both identifiers are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyComponentUid`] or
    /// [`ValidationError::EmptyStatusUid`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.component_uid.trim().is_empty() {
            return Err(ValidationError::EmptyComponentUid);
        }
        if self.status_uid.trim().is_empty() {
            return Err(ValidationError::EmptyStatusUid);
        }
        Ok(())
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component_uid, self.status_uid)
    }
}

/// A status value reported at a point in time. Never persisted as such,
/// only folded into intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub series: SeriesKey,
    pub value: String,
    pub timestamp: Timestamp,
}

impl Observation {
    /// Create a builder for constructing an [`Observation`].
    #[must_use]
    pub fn builder() -> ObservationBuilder {
        ObservationBuilder::default()
    }

    #[must_use]
    pub fn component_uid(&self) -> &str {
        &self.series.component_uid
    }

    #[must_use]
    pub fn status_uid(&self) -> &str {
        &self.series.status_uid
    }
}

/// Step-by-step builder for [`Observation`].
#[derive(Debug, Default)]
pub struct ObservationBuilder {
    component_uid: Option<String>,
    status_uid: Option<String>,
    value: Option<String>,
    timestamp: Option<Timestamp>,
}

impl ObservationBuilder {
    #[must_use]
    pub fn component_uid(mut self, component_uid: impl Into<String>) -> Self {
        self.component_uid = Some(component_uid.into());
        self
    }

    #[must_use]
    pub fn status_uid(mut self, status_uid: impl Into<String>) -> Self {
        self.status_uid = Some(status_uid.into());
        self
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Consume the builder. The timestamp defaults to now and the value to
    /// the empty string.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if either identifier is missing or empty.
    pub fn build(self) -> Result<Observation, ValidationError> {
        let series = SeriesKey::new(
            self.component_uid.unwrap_or_default(),
            self.status_uid.unwrap_or_default(),
        )?;
        Ok(Observation {
            series,
            value: self.value.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_else(crate::time::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;

    #[test]
    fn should_build_observation_with_all_fields() {
        let ts = now();
        let observation = Observation::builder()
            .component_uid("livingroom.sensor")
            .status_uid("temperature.value")
            .value("21.5")
            .timestamp(ts)
            .build()
            .unwrap();

        assert_eq!(observation.component_uid(), "livingroom.sensor");
        assert_eq!(observation.status_uid(), "temperature.value");
        assert_eq!(observation.value, "21.5");
        assert_eq!(observation.timestamp, ts);
    }

    #[test]
    fn should_default_value_to_empty_string() {
        let observation = Observation::builder()
            .component_uid("c1")
            .status_uid("s1")
            .build()
            .unwrap();
        assert!(observation.value.is_empty());
    }

    #[test]
    fn should_reject_missing_component_uid() {
        let result = Observation::builder().status_uid("s1").build();
        assert_eq!(result, Err(ValidationError::EmptyComponentUid));
    }

    #[test]
    fn should_reject_blank_status_uid() {
        let result = SeriesKey::new("c1", "  ");
        assert_eq!(result, Err(ValidationError::EmptyStatusUid));
    }

    #[test]
    fn should_display_series_as_dotted_pair() {
        let key = SeriesKey::new("c1", "s1").unwrap();
        assert_eq!(key.to_string(), "c1.s1");
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let observation = Observation::builder()
            .component_uid("c1")
            .status_uid("s1")
            .value("on")
            .build()
            .unwrap();
        let json = serde_json::to_string(&observation).unwrap();
        let parsed: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, observation);
    }
}
