//! Interval repository port — persistence of history intervals.

use std::future::Future;

use chrono::TimeDelta;
use tokio_util::sync::CancellationToken;

use hubhist_domain::error::HistoryError;
use hubhist_domain::interval::{
    IntervalPage, IntervalQuery, RowCount, SeriesFilter, UpdateOutcome,
};
use hubhist_domain::observation::Observation;

/// Stores the lifetime of status values as non-overlapping intervals.
///
/// Implementations serialize operations per series; different series never
/// contend with each other.
pub trait IntervalRepository {
    /// Fold one observation into its series.
    ///
    /// A value equal to the last interval's value extends that interval,
    /// unless more than `outdated_after` passed since its end.
    fn update(
        &self,
        observation: Observation,
        outdated_after: TimeDelta,
    ) -> impl Future<Output = Result<UpdateOutcome, HistoryError>> + Send;

    /// Intervals of one series intersecting the query range, ascending.
    fn query(
        &self,
        query: IntervalQuery,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<IntervalPage, HistoryError>> + Send;

    /// Remove whole day shards matching the filter. Returns the number of
    /// shards removed.
    fn delete(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<usize, HistoryError>> + Send;

    /// Count the intervals matching the filter, listing unreadable shards.
    fn row_count(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RowCount, HistoryError>> + Send;
}

impl<T: IntervalRepository + Send + Sync> IntervalRepository for std::sync::Arc<T> {
    fn update(
        &self,
        observation: Observation,
        outdated_after: TimeDelta,
    ) -> impl Future<Output = Result<UpdateOutcome, HistoryError>> + Send {
        (**self).update(observation, outdated_after)
    }

    fn query(
        &self,
        query: IntervalQuery,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<IntervalPage, HistoryError>> + Send {
        (**self).query(query, cancel)
    }

    fn delete(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<usize, HistoryError>> + Send {
        (**self).delete(filter, cancel)
    }

    fn row_count(
        &self,
        filter: SeriesFilter,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RowCount, HistoryError>> + Send {
        (**self).row_count(filter, cancel)
    }
}
