//! File implementation of [`IntervalRepository`].
//!
//! [`LogStore`] does the synchronous work on std files; the async
//! [`TokenLogRepository`] runs each operation on tokio's blocking pool.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use hubhist_app::ports::IntervalRepository;
use hubhist_domain::day_path::DayPath;
use hubhist_domain::error::HistoryError;
use hubhist_domain::interval::{
    Interval, IntervalPage, IntervalQuery, RowCount, SeriesFilter, SkippedShard, UpdateOutcome,
};
use hubhist_domain::observation::{Observation, SeriesKey};
use hubhist_domain::time::{Timestamp, truncate_to_millis};
use hubhist_domain::token::DayOffset;

use crate::config::Config;
use crate::error::LogError;
use crate::layout::{Layout, Shard};
use crate::locks::SeriesLocks;
use crate::stream::IntervalLogStream;

/// Last known interval of a series and the shard holding it.
#[derive(Debug, Clone)]
struct Tail {
    day: DayPath,
    interval: Interval,
}

/// Synchronous interval store over day-sharded token logs.
#[derive(Debug)]
pub struct LogStore {
    layout: Layout,
    lock_timeout: Duration,
    locks: SeriesLocks,
    tails: Mutex<HashMap<SeriesKey, Tail>>,
}

impl LogStore {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            layout: Layout::new(&config.root),
            lock_timeout: config.lock_timeout,
            locks: SeriesLocks::default(),
            tails: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Fold one observation into its series.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::SeriesLockTimeout`] under contention,
    /// [`HistoryError::CorruptLog`] when the shard does not end on a complete
    /// interval, or a storage error if the shard cannot be written.
    pub fn update(
        &self,
        observation: &Observation,
        outdated_after: TimeDelta,
    ) -> Result<UpdateOutcome, HistoryError> {
        observation.series.validate()?;
        let series = &observation.series;
        self.locks.with_series(series, self.lock_timeout, || {
            let result = self.update_locked(observation, outdated_after);
            if result.is_err() {
                self.tails.lock().remove(series);
            }
            result
        })
    }

    fn update_locked(
        &self,
        observation: &Observation,
        outdated_after: TimeDelta,
    ) -> Result<UpdateOutcome, HistoryError> {
        let series = &observation.series;
        let value = observation.value.as_str();
        let timestamp = truncate_to_millis(observation.timestamp);
        let day = DayPath::of(timestamp);
        let offset = DayOffset::of(timestamp);

        let path = self.layout.shard_path(series, day);
        let created = !path.exists();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(LogError::from)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(LogError::from)?;
        if created {
            tracing::debug!(%series, %day, "created history shard");
        }
        let mut stream = IntervalLogStream::new(file)?;

        let tail = self.resolve_tail(series, day, &mut stream)?;

        let action = match &tail {
            None => Action::Append,
            Some(tail) => decide(tail, day, timestamp, value, outdated_after),
        };

        match action {
            Action::Skip(outcome) => Ok(outcome),
            Action::Append => {
                stream.seek_end();
                stream.write_element(offset, value, offset)?;
                stream.flush()?;
                self.tails.lock().insert(
                    series.clone(),
                    Tail {
                        day,
                        interval: Interval::at(timestamp, value),
                    },
                );
                Ok(UpdateOutcome::Appended)
            }
            Action::Patch => {
                stream.patch_last_end(offset)?;
                stream.flush()?;
                if let Some(mut tail) = tail {
                    tail.interval.range_end = timestamp;
                    self.tails.lock().insert(series.clone(), tail);
                }
                Ok(UpdateOutcome::Extended)
            }
        }
    }

    fn resolve_tail(
        &self,
        series: &SeriesKey,
        day: DayPath,
        stream: &mut IntervalLogStream<File>,
    ) -> Result<Option<Tail>, HistoryError> {
        let cached = self.tails.lock().get(series).cloned();
        if let Some(tail) = cached.as_ref().filter(|tail| tail.day >= day) {
            return Ok(Some(tail.clone()));
        }
        if let Some(element) = stream.last_element()? {
            return Ok(Some(Tail {
                day,
                interval: element.into_interval(day),
            }));
        }
        Ok(cached)
    }

    /// Intervals of one series intersecting the query range, ascending.
    ///
    /// Shards that fail to read are logged, reported in
    /// [`IntervalPage::skipped_shards`] and contribute the intervals read
    /// before the failure.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] for an invalid query,
    /// [`HistoryError::Cancelled`] when `cancel` fires, or
    /// [`HistoryError::SeriesLockTimeout`] under contention.
    pub fn query(
        &self,
        query: &IntervalQuery,
        cancel: &CancellationToken,
    ) -> Result<IntervalPage, HistoryError> {
        query.validate()?;
        let series = &query.series;
        self.locks.with_series(series, self.lock_timeout, || {
            let mut page = IntervalPage::default();
            if query.max_count == 0 {
                return Ok(page);
            }

            let shards = self
                .layout
                .shards(&self.layout.series_dir(series))
                .map_err(LogError::from)?;
            let range = (Some(query.range_start), Some(query.range_end));
            for shard in shards.into_iter().filter(|shard| shard.day.overlaps(range.0, range.1)) {
                if cancel.is_cancelled() {
                    return Err(HistoryError::Cancelled);
                }
                match read_intervals(&shard, query, cancel, &mut page.intervals) {
                    Ok(()) => {}
                    Err(HistoryError::Cancelled) => return Err(HistoryError::Cancelled),
                    Err(err) => {
                        tracing::warn!(%series, day = %shard.day, error = %err, "skipping unreadable history shard");
                        page.skipped_shards.push(SkippedShard::new(series, shard.day, &err));
                    }
                }
                if page.intervals.len() >= query.max_count {
                    break;
                }
            }
            Ok(page)
        })
    }

    /// Remove whole shards whose day lies inside the filter range.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] for an invalid filter,
    /// [`HistoryError::Cancelled`] when `cancel` fires, or a storage error.
    pub fn delete(
        &self,
        filter: &SeriesFilter,
        cancel: &CancellationToken,
    ) -> Result<usize, HistoryError> {
        filter.validate()?;
        let mut removed = 0;
        for series_dir in self.layout.series(filter).map_err(LogError::from)? {
            if cancel.is_cancelled() {
                return Err(HistoryError::Cancelled);
            }
            let series = &series_dir.series;
            removed += self.locks.with_series(series, self.lock_timeout, || {
                let mut removed = 0;
                let shards = self.layout.shards(&series_dir.path).map_err(LogError::from)?;
                for shard in shards {
                    if shard.day.is_within(filter.range_start, filter.range_end) {
                        fs::remove_file(&shard.path).map_err(LogError::from)?;
                        removed += 1;
                    }
                }
                self.tails.lock().remove(series);
                self.layout.prune(&series_dir.path).map_err(LogError::from)?;
                Ok(removed)
            })?;
            if !series_dir.path.exists() {
                self.locks.release(series);
            }
        }
        Ok(removed)
    }

    /// Count intervals intersecting the optional filter range.
    ///
    /// Unreadable shards are logged, counted up to the failure and reported
    /// in [`RowCount::skipped_shards`].
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidParameters`] for an invalid filter,
    /// [`HistoryError::Cancelled`] when `cancel` fires, or a storage error
    /// while listing shards.
    pub fn row_count(
        &self,
        filter: &SeriesFilter,
        cancel: &CancellationToken,
    ) -> Result<RowCount, HistoryError> {
        filter.validate()?;
        let mut total = RowCount::default();
        for series_dir in self.layout.series(filter).map_err(LogError::from)? {
            let series = &series_dir.series;
            self.locks.with_series(series, self.lock_timeout, || {
                let shards = self.layout.shards(&series_dir.path).map_err(LogError::from)?;
                for shard in shards
                    .iter()
                    .filter(|shard| shard.day.overlaps(filter.range_start, filter.range_end))
                {
                    if cancel.is_cancelled() {
                        return Err(HistoryError::Cancelled);
                    }
                    match count_spans(shard, filter, cancel, &mut total.row_count) {
                        Ok(()) => {}
                        Err(HistoryError::Cancelled) => return Err(HistoryError::Cancelled),
                        Err(err) => {
                            tracing::warn!(%series, day = %shard.day, error = %err, "skipping unreadable history shard");
                            total.skipped_shards.push(SkippedShard::new(series, shard.day, &err));
                        }
                    }
                }
                Ok(())
            })?;
        }
        Ok(total)
    }
}

enum Action {
    Append,
    Patch,
    Skip(UpdateOutcome),
}

fn decide(
    tail: &Tail,
    day: DayPath,
    timestamp: Timestamp,
    value: &str,
    outdated_after: TimeDelta,
) -> Action {
    let last = &tail.interval;
    let same_value = last.value == value;

    if timestamp < last.range_end {
        return Action::Skip(UpdateOutcome::Stale);
    }
    if timestamp == last.range_end {
        if same_value {
            return Action::Skip(UpdateOutcome::Extended);
        }
        // A zero-length tail already owns this instant.
        if last.range_start == timestamp {
            return Action::Skip(UpdateOutcome::Stale);
        }
        return Action::Append;
    }
    if timestamp - last.range_end > outdated_after || !same_value {
        return Action::Append;
    }
    // End offsets are relative to the shard's own day.
    if tail.day != day {
        return Action::Append;
    }
    Action::Patch
}

fn open_for_read(shard: &Shard) -> Result<IntervalLogStream<File>, HistoryError> {
    let file = OpenOptions::new()
        .read(true)
        .open(&shard.path)
        .map_err(LogError::from)?;
    Ok(IntervalLogStream::new(file)?)
}

fn read_intervals(
    shard: &Shard,
    query: &IntervalQuery,
    cancel: &CancellationToken,
    intervals: &mut Vec<Interval>,
) -> Result<(), HistoryError> {
    let mut stream = open_for_read(shard)?;
    while intervals.len() < query.max_count {
        if cancel.is_cancelled() {
            return Err(HistoryError::Cancelled);
        }
        let Some(element) = stream.next_element()? else {
            break;
        };
        let interval = element.into_interval(shard.day);
        if interval.range_start > query.range_end {
            break;
        }
        if interval.intersects(query.range_start, query.range_end) {
            intervals.push(interval);
        }
    }
    Ok(())
}

fn count_spans(
    shard: &Shard,
    filter: &SeriesFilter,
    cancel: &CancellationToken,
    count: &mut u64,
) -> Result<(), HistoryError> {
    let mut stream = open_for_read(shard)?;
    while let Some((begin, end)) = stream.next_span()? {
        if cancel.is_cancelled() {
            return Err(HistoryError::Cancelled);
        }
        let start = shard.day.at(begin);
        let end = shard.day.at(end);
        let in_range = filter.range_start.is_none_or(|range_start| end >= range_start)
            && filter.range_end.is_none_or(|range_end| start <= range_end);
        if in_range {
            *count += 1;
        }
    }
    Ok(())
}

/// Async [`IntervalRepository`] over a shared [`LogStore`].
#[derive(Debug, Clone)]
pub struct TokenLogRepository {
    store: Arc<LogStore>,
}

impl TokenLogRepository {
    /// Open the store described by `config`, creating its history directory.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the directory cannot be created.
    pub fn open(config: Config) -> Result<Self, LogError> {
        let store = LogStore::new(config);
        fs::create_dir_all(store.layout().history_dir())?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    #[must_use]
    pub fn store(&self) -> &LogStore {
        &self.store
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(&LogStore) -> Result<T, HistoryError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || operation(&store))
            .await
            .map_err(LogError::from)?
    }
}

impl IntervalRepository for TokenLogRepository {
    async fn update(
        &self,
        observation: Observation,
        outdated_after: TimeDelta,
    ) -> Result<UpdateOutcome, HistoryError> {
        self.run(move |store| store.update(&observation, outdated_after))
            .await
    }

    async fn query(
        &self,
        query: IntervalQuery,
        cancel: CancellationToken,
    ) -> Result<IntervalPage, HistoryError> {
        self.run(move |store| store.query(&query, &cancel)).await
    }

    async fn delete(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> Result<usize, HistoryError> {
        self.run(move |store| store.delete(&filter, &cancel)).await
    }

    async fn row_count(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> Result<RowCount, HistoryError> {
        self.run(move |store| store.row_count(&filter, &cancel))
            .await
    }
}
