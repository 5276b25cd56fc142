//! History service — use-cases for recording and reading status history.

use std::time::{Duration, Instant};

use chrono::TimeDelta;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use hubhist_domain::error::HistoryError;
use hubhist_domain::extract::{DataType, Extract, ExtractRequest, build_extract, default_interval};
use hubhist_domain::interval::{IntervalQuery, RowCount, SeriesFilter, UpdateOutcome};
use hubhist_domain::observation::Observation;

use crate::blacklist::Blacklist;
use crate::ports::IntervalRepository;
use crate::value_formatter::ValueFormatter;

/// Behaviour switches of the [`HistoryService`].
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// When `false`, reports are acknowledged but never stored.
    pub enabled: bool,
    /// Gap after which an unchanged value starts a new interval.
    pub outdated_after: TimeDelta,
    /// Default value for number samples taken before any known value.
    pub fill_value: Option<String>,
    pub formatter: ValueFormatter,
    /// Series that are acknowledged but never stored.
    pub blacklist: Blacklist,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            outdated_after: TimeDelta::seconds(360),
            fill_value: None,
            formatter: ValueFormatter::default(),
            blacklist: Blacklist::default(),
        }
    }
}

/// Timing of the updates handled since start or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateStatistics {
    pub update_count: u64,
    pub last_update_duration_us: u64,
    pub min_update_duration_us: u64,
    pub max_update_duration_us: u64,
    pub average_update_duration_us: u64,
}

#[derive(Debug, Default)]
struct StatisticsAccumulator {
    count: u64,
    total_us: u128,
    last_us: u64,
    min_us: Option<u64>,
    max_us: u64,
}

impl StatisticsAccumulator {
    fn record(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count += 1;
        self.total_us += u128::from(micros);
        self.last_us = micros;
        self.min_us = Some(self.min_us.map_or(micros, |min| min.min(micros)));
        self.max_us = self.max_us.max(micros);
    }

    fn snapshot(&self) -> UpdateStatistics {
        let average = if self.count == 0 {
            0
        } else {
            u64::try_from(self.total_us / u128::from(self.count)).unwrap_or(u64::MAX)
        };
        UpdateStatistics {
            update_count: self.count,
            last_update_duration_us: self.last_us,
            min_update_duration_us: self.min_us.unwrap_or_default(),
            max_update_duration_us: self.max_us,
            average_update_duration_us: average,
        }
    }
}

/// Application service for recording observations and querying history.
pub struct HistoryService<R> {
    repo: R,
    options: HistoryOptions,
    statistics: Mutex<StatisticsAccumulator>,
}

impl<R: IntervalRepository> HistoryService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            options: HistoryOptions::default(),
            statistics: Mutex::new(StatisticsAccumulator::default()),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: HistoryOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    /// Record an observation.
    ///
    /// The value is normalized by the configured formatter before it is
    /// folded into the series. Returns [`UpdateOutcome::Skipped`] without
    /// touching storage when history is disabled or the series is
    /// blacklisted.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] for empty identifiers, or
    /// an error propagated from the repository.
    #[tracing::instrument(
        skip(self, observation),
        fields(component_uid = %observation.component_uid(), status_uid = %observation.status_uid())
    )]
    pub async fn report(&self, mut observation: Observation) -> Result<UpdateOutcome, HistoryError> {
        if !self.options.enabled {
            return Ok(UpdateOutcome::Skipped);
        }
        observation.series.validate()?;
        if self.options.blacklist.contains(&observation.series) {
            tracing::debug!("skipped blacklisted series");
            return Ok(UpdateOutcome::Skipped);
        }
        observation.value = self
            .options
            .formatter
            .format(&observation.series, &observation.value);

        let started = Instant::now();
        let outcome = self
            .repo
            .update(observation, self.options.outdated_after)
            .await?;
        self.statistics.lock().record(started.elapsed());

        if outcome == UpdateOutcome::Stale {
            tracing::debug!("dropped stale observation");
        }
        Ok(outcome)
    }

    /// Build a text or number extract of one series.
    ///
    /// Number extracts default to a 5 minute interval; the fill value defaults
    /// to the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] when the request breaks its
    /// contract, [`HistoryError::Cancelled`] when `cancel` fires, or an error
    /// propagated from the repository.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(
            component_uid = %request.series.component_uid,
            status_uid = %request.series.status_uid,
            data_type = ?request.data_type,
        )
    )]
    pub async fn build_extract(
        &self,
        mut request: ExtractRequest,
        cancel: CancellationToken,
    ) -> Result<Extract, HistoryError> {
        request.validate()?;
        if request.data_type == DataType::Number && request.interval.is_none() {
            request.interval = Some(default_interval());
        }
        if request.fill_value.is_none() {
            request.fill_value.clone_from(&self.options.fill_value);
        }

        let query = IntervalQuery {
            series: request.series.clone(),
            range_start: request.range_start,
            range_end: request.range_end,
            max_count: request.max_row_count,
        };
        let page = self.repo.query(query, cancel).await?;
        Ok(build_extract(&request, page))
    }

    /// Remove whole day shards matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] for an inconsistent
    /// filter, or an error propagated from the repository.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> Result<usize, HistoryError> {
        let filter = filter.normalized();
        filter.validate()?;
        let deleted = self.repo.delete(filter, cancel).await?;
        tracing::info!(deleted, "deleted history shards");
        Ok(deleted)
    }

    /// Count intervals matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] for an inconsistent
    /// filter, or an error propagated from the repository.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn row_count(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> Result<RowCount, HistoryError> {
        let filter = filter.normalized();
        filter.validate()?;
        self.repo.row_count(filter, cancel).await
    }

    #[must_use]
    pub fn statistics(&self) -> UpdateStatistics {
        self.statistics.lock().snapshot()
    }

    pub fn reset_statistics(&self) {
        *self.statistics.lock() = StatisticsAccumulator::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hubhist_domain::error::ValidationError;
    use hubhist_domain::extract::DataPointValue;
    use hubhist_domain::interval::{Interval, IntervalPage};
    use hubhist_domain::observation::SeriesKey;
    use hubhist_domain::time::Timestamp;
    use std::collections::BTreeMap;
    use std::future::Future;

    /// Keeps intervals per series with the same folding rules as the log
    /// repository, minus day shards.
    #[derive(Default)]
    struct InMemoryIntervalRepo {
        store: Mutex<BTreeMap<SeriesKey, Vec<Interval>>>,
        last_query: Mutex<Option<IntervalQuery>>,
    }

    impl InMemoryIntervalRepo {
        fn intervals(&self, series: &SeriesKey) -> Vec<Interval> {
            self.store.lock().get(series).cloned().unwrap_or_default()
        }
    }

    impl IntervalRepository for InMemoryIntervalRepo {
        fn update(
            &self,
            observation: Observation,
            outdated_after: TimeDelta,
        ) -> impl Future<Output = Result<UpdateOutcome, HistoryError>> + Send {
            let mut store = self.store.lock();
            let intervals = store.entry(observation.series.clone()).or_default();
            let ts = observation.timestamp;
            let tail = intervals
                .last()
                .map(|last| (last.range_end, last.value == observation.value));
            let outcome = match tail {
                Some((end, _)) if ts < end => UpdateOutcome::Stale,
                Some((end, true)) if ts - end <= outdated_after => {
                    if let Some(last) = intervals.last_mut() {
                        last.range_end = ts;
                    }
                    UpdateOutcome::Extended
                }
                _ => {
                    intervals.push(Interval::at(ts, observation.value));
                    UpdateOutcome::Appended
                }
            };
            async move { Ok(outcome) }
        }

        fn query(
            &self,
            query: IntervalQuery,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<IntervalPage, HistoryError>> + Send {
            let intervals = self
                .intervals(&query.series)
                .into_iter()
                .filter(|interval| interval.intersects(query.range_start, query.range_end))
                .take(query.max_count)
                .collect();
            *self.last_query.lock() = Some(query);
            async move {
                Ok(IntervalPage {
                    intervals,
                    skipped_shards: Vec::new(),
                })
            }
        }

        fn delete(
            &self,
            filter: SeriesFilter,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<usize, HistoryError>> + Send {
            let mut store = self.store.lock();
            let before = store.len();
            store.retain(|key, _| {
                filter
                    .component_uid
                    .as_ref()
                    .is_some_and(|uid| uid != &key.component_uid)
                    || filter
                        .status_uid
                        .as_ref()
                        .is_some_and(|uid| uid != &key.status_uid)
            });
            let removed = before - store.len();
            async move { Ok(removed) }
        }

        fn row_count(
            &self,
            filter: SeriesFilter,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<RowCount, HistoryError>> + Send {
            let row_count = self
                .store
                .lock()
                .values()
                .flatten()
                .filter(|interval| filter.matches(interval))
                .count() as u64;
            async move {
                Ok(RowCount {
                    row_count,
                    skipped_shards: Vec::new(),
                })
            }
        }
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn observation(status: &str, value: &str, at: Timestamp) -> Observation {
        Observation::builder()
            .component_uid("livingroom.sensor")
            .status_uid(status)
            .value(value)
            .timestamp(at)
            .build()
            .unwrap()
    }

    fn series(status: &str) -> SeriesKey {
        SeriesKey::new("livingroom.sensor", status).unwrap()
    }

    fn extract_request(data_type: DataType) -> ExtractRequest {
        ExtractRequest {
            series: series("temperature.value"),
            range_start: t0(),
            range_end: t0() + TimeDelta::minutes(10),
            interval: None,
            data_type,
            max_row_count: 100,
            fill_value: None,
        }
    }

    #[tokio::test]
    async fn should_round_values_before_storing() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());

        service
            .report(observation("temperature.value", "21.46", t0()))
            .await
            .unwrap();

        let stored = service.repo.intervals(&series("temperature.value"));
        assert_eq!(stored[0].value, "21.5");
    }

    #[tokio::test]
    async fn should_extend_interval_when_rounded_values_match() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());

        service
            .report(observation("temperature.value", "21.46", t0()))
            .await
            .unwrap();
        let outcome = service
            .report(observation(
                "temperature.value",
                "21.51",
                t0() + TimeDelta::minutes(1),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Extended);
        assert_eq!(service.repo.intervals(&series("temperature.value")).len(), 1);
    }

    #[tokio::test]
    async fn should_skip_reports_when_disabled() {
        let service = HistoryService::new(InMemoryIntervalRepo::default()).with_options(
            HistoryOptions {
                enabled: false,
                ..HistoryOptions::default()
            },
        );

        let outcome = service
            .report(observation("power.state", "on", t0()))
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Skipped);
        assert!(service.repo.intervals(&series("power.state")).is_empty());
        assert_eq!(service.statistics().update_count, 0);
    }

    #[tokio::test]
    async fn should_skip_reports_for_blacklisted_series() {
        let service = HistoryService::new(InMemoryIntervalRepo::default()).with_options(
            HistoryOptions {
                blacklist: Blacklist {
                    statuses: std::collections::HashSet::from(["rssi.value".to_string()]),
                    ..Blacklist::default()
                },
                ..HistoryOptions::default()
            },
        );

        let skipped = service
            .report(observation("rssi.value", "-70", t0()))
            .await
            .unwrap();
        let stored = service
            .report(observation("power.state", "on", t0()))
            .await
            .unwrap();

        assert_eq!(skipped, UpdateOutcome::Skipped);
        assert_eq!(stored, UpdateOutcome::Appended);
        assert!(service.repo.intervals(&series("rssi.value")).is_empty());
        assert_eq!(service.statistics().update_count, 1);
    }

    #[tokio::test]
    async fn should_reject_report_with_blank_status() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        let mut obs = observation("power.state", "on", t0());
        obs.series.status_uid = " ".to_string();

        let result = service.report(obs).await;

        assert!(matches!(
            result,
            Err(HistoryError::InvalidParameters(ValidationError::EmptyStatusUid))
        ));
    }

    #[tokio::test]
    async fn should_track_update_statistics() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        for minute in 0..3 {
            service
                .report(observation(
                    "power.state",
                    "on",
                    t0() + TimeDelta::minutes(minute),
                ))
                .await
                .unwrap();
        }

        let stats = service.statistics();
        assert_eq!(stats.update_count, 3);
        assert!(stats.min_update_duration_us <= stats.max_update_duration_us);

        service.reset_statistics();
        assert_eq!(service.statistics(), UpdateStatistics::default());
    }

    #[tokio::test]
    async fn should_default_number_interval_to_five_minutes() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        service
            .report(observation("temperature.value", "20", t0()))
            .await
            .unwrap();
        service
            .report(observation(
                "temperature.value",
                "20",
                t0() + TimeDelta::minutes(10),
            ))
            .await
            .unwrap();

        let extract = service
            .build_extract(extract_request(DataType::Number), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(extract.data_points.len(), 3);
        assert_eq!(
            extract.data_points[1].timestamp,
            t0() + TimeDelta::minutes(5)
        );
        assert_eq!(
            extract.data_points[2].value,
            Some(DataPointValue::Number(20.0))
        );
    }

    #[tokio::test]
    async fn should_pass_max_row_count_to_repository() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        let mut request = extract_request(DataType::Text);
        request.max_row_count = 7;

        service
            .build_extract(request, CancellationToken::new())
            .await
            .unwrap();

        let query = service.repo.last_query.lock().clone().unwrap();
        assert_eq!(query.max_count, 7);
    }

    #[tokio::test]
    async fn should_apply_configured_fill_value() {
        let service = HistoryService::new(InMemoryIntervalRepo::default()).with_options(
            HistoryOptions {
                fill_value: Some("unknown".to_string()),
                ..HistoryOptions::default()
            },
        );
        for minute in [7, 10] {
            service
                .report(observation(
                    "temperature.value",
                    "20",
                    t0() + TimeDelta::minutes(minute),
                ))
                .await
                .unwrap();
        }

        let extract = service
            .build_extract(extract_request(DataType::Number), CancellationToken::new())
            .await
            .unwrap();

        let values: Vec<_> = extract
            .data_points
            .iter()
            .map(|point| point.value.clone())
            .collect();
        assert_eq!(
            values,
            [
                Some(DataPointValue::Text("unknown".to_string())),
                Some(DataPointValue::Text("unknown".to_string())),
                Some(DataPointValue::Number(20.0)),
            ]
        );
    }

    #[tokio::test]
    async fn should_reject_text_extract_with_interval() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        let mut request = extract_request(DataType::Text);
        request.interval = Some(TimeDelta::minutes(1));

        let result = service
            .build_extract(request, CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(HistoryError::InvalidParameters(
                ValidationError::IntervalWithText
            ))
        ));
        assert!(service.repo.last_query.lock().is_none());
    }

    #[tokio::test]
    async fn should_delete_every_status_of_a_component() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        service
            .report(observation("temperature.value", "20", t0()))
            .await
            .unwrap();
        service
            .report(observation("humidity.value", "50", t0()))
            .await
            .unwrap();

        let deleted = service
            .delete(
                SeriesFilter::component("livingroom.sensor"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let remaining = service
            .row_count(SeriesFilter::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(remaining.row_count, 0);
    }

    #[tokio::test]
    async fn should_reject_status_filter_without_component() {
        let service = HistoryService::new(InMemoryIntervalRepo::default());
        let filter = SeriesFilter {
            status_uid: Some("power.state".to_string()),
            ..SeriesFilter::default()
        };

        let result = service.row_count(filter, CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(HistoryError::InvalidParameters(
                ValidationError::StatusWithoutComponent
            ))
        ));
    }
}
