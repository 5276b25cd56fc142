//! Observation bus port — publish status observations to subscribers.

use std::future::Future;

use hubhist_domain::error::HistoryError;
use hubhist_domain::observation::Observation;

/// Publishes observations to interested subscribers.
pub trait ObservationPublisher {
    /// Publish an observation to all current subscribers.
    fn publish(
        &self,
        observation: Observation,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send;
}

impl<T: ObservationPublisher + Send + Sync> ObservationPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        observation: Observation,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send {
        (**self).publish(observation)
    }
}
