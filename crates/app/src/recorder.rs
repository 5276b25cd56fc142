//! History recorder — feeds the [`HistoryService`] from the observation bus.
//!
//! The recorder subscribes to the in-process bus and reports every
//! observation. Failures are logged and never stop the loop; only bus
//! closure or shutdown do.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use hubhist_domain::error::HistoryError;
use hubhist_domain::interval::UpdateOutcome;
use hubhist_domain::observation::Observation;

use crate::ports::IntervalRepository;
use crate::services::history_service::HistoryService;

/// Subscribes to observations and records them.
pub struct HistoryRecorder<R> {
    service: Arc<HistoryService<R>>,
}

impl<R: IntervalRepository> HistoryRecorder<R> {
    pub fn new(service: Arc<HistoryService<R>>) -> Self {
        Self { service }
    }

    /// Record one observation through the service, which applies the
    /// blacklist.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`HistoryService::report`].
    pub async fn record(&self, observation: Observation) -> Result<UpdateOutcome, HistoryError> {
        self.service.report(observation).await
    }

    /// Process observations until the bus closes or `shutdown` fires.
    pub async fn run(self, mut receiver: broadcast::Receiver<Observation>, shutdown: CancellationToken) {
        tracing::info!("history recorder started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(observation) => {
                        let series = observation.series.to_string();
                        if let Err(err) = self.record(observation).await {
                            tracing::warn!(%series, error = %err, "failed to record observation");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "history recorder lagged behind the observation bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("history recorder stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::Blacklist;
    use crate::observation_bus::ObservationBus;
    use crate::ports::ObservationPublisher;
    use crate::services::history_service::HistoryOptions;
    use chrono::TimeDelta;
    use hubhist_domain::interval::{IntervalPage, IntervalQuery, RowCount, SeriesFilter};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::future::Future;

    /// Remembers every observation it is asked to store.
    #[derive(Default)]
    struct RecordingRepo {
        updates: Mutex<Vec<Observation>>,
    }

    impl IntervalRepository for RecordingRepo {
        fn update(
            &self,
            observation: Observation,
            _outdated_after: TimeDelta,
        ) -> impl Future<Output = Result<UpdateOutcome, HistoryError>> + Send {
            self.updates.lock().push(observation);
            async { Ok(UpdateOutcome::Appended) }
        }

        fn query(
            &self,
            _query: IntervalQuery,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<IntervalPage, HistoryError>> + Send {
            async { Ok(IntervalPage::default()) }
        }

        fn delete(
            &self,
            _filter: SeriesFilter,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<usize, HistoryError>> + Send {
            async { Ok(0) }
        }

        fn row_count(
            &self,
            _filter: SeriesFilter,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<RowCount, HistoryError>> + Send {
            async { Ok(RowCount::default()) }
        }
    }

    fn observation(component: &str, status: &str) -> Observation {
        Observation::builder()
            .component_uid(component)
            .status_uid(status)
            .value("1")
            .build()
            .unwrap()
    }

    fn recorder(blacklist: Blacklist) -> (HistoryRecorder<Arc<RecordingRepo>>, Arc<RecordingRepo>) {
        let repo = Arc::new(RecordingRepo::default());
        let service = HistoryService::new(Arc::clone(&repo)).with_options(HistoryOptions {
            blacklist,
            ..HistoryOptions::default()
        });
        (HistoryRecorder::new(Arc::new(service)), repo)
    }

    #[tokio::test]
    async fn should_skip_blacklisted_series() {
        let (recorder, repo) = recorder(Blacklist {
            components: HashSet::from(["garage.door".to_string()]),
            ..Blacklist::default()
        });

        let skipped = recorder
            .record(observation("garage.door", "state"))
            .await
            .unwrap();
        let recorded = recorder
            .record(observation("garage.light", "state"))
            .await
            .unwrap();

        assert_eq!(skipped, UpdateOutcome::Skipped);
        assert_eq!(recorded, UpdateOutcome::Appended);
        let updates = repo.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].component_uid(), "garage.light");
    }

    #[tokio::test]
    async fn should_record_published_observations_until_shutdown() {
        let (recorder, repo) = recorder(Blacklist::default());
        let bus = ObservationBus::new(16);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(recorder.run(bus.subscribe(), shutdown.clone()));

        bus.publish(observation("a", "state")).await.unwrap();
        bus.publish(observation("b", "state")).await.unwrap();

        for _ in 0..100 {
            if repo.updates.lock().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(repo.updates.lock().len(), 2);
    }

    #[tokio::test]
    async fn should_stop_when_bus_is_dropped() {
        let (recorder, _repo) = recorder(Blacklist::default());
        let bus = ObservationBus::new(16);
        let receiver = bus.subscribe();
        drop(bus);

        recorder.run(receiver, CancellationToken::new()).await;
    }
}
