//! In-process observation bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use hubhist_domain::error::HistoryError;
use hubhist_domain::observation::Observation;

use crate::ports::ObservationPublisher;

/// In-process observation bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the observation is simply dropped).
#[derive(Clone)]
pub struct ObservationBus {
    sender: broadcast::Sender<Observation>,
}

impl ObservationBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to observations on this bus.
    ///
    /// Returns a receiver that will get all observations published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Observation> {
        self.sender.subscribe()
    }
}

impl ObservationPublisher for ObservationBus {
    fn publish(
        &self,
        observation: Observation,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send {
        // Fails only without receivers.
        let _ = self.sender.send(observation);
        async { Ok(()) }
    }
}
