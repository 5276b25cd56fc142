//! Series excluded from history.

use std::collections::HashSet;

use hubhist_domain::observation::SeriesKey;

/// Components, statuses and single series that are never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    /// Every status of these components.
    pub components: HashSet<String>,
    /// These statuses on every component.
    pub statuses: HashSet<String>,
    /// Single series, written `component.status`.
    pub series: HashSet<String>,
}

impl Blacklist {
    #[must_use]
    pub fn contains(&self, series: &SeriesKey) -> bool {
        self.components.contains(&series.component_uid)
            || self.statuses.contains(&series.status_uid)
            || self.series.contains(&series.to_string())
    }
}
