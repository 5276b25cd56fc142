//! Shared application state for axum handlers.

use std::sync::Arc;
use std::time::Duration;

use hubhist_app::observation_bus::ObservationBus;
use hubhist_app::ports::IntervalRepository;
use hubhist_app::services::history_service::HistoryService;

/// Default bound on the duration of one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_OBSERVATION_CAPACITY: usize = 64;

/// Application state shared across all axum handlers.
///
/// Generic over the repository type.
/// `Clone` is implemented manually so the repository itself does not need to
/// be `Clone`.
pub struct AppState<R> {
    /// History recording and extraction service.
    pub history_service: Arc<HistoryService<R>>,
    /// Receives observations posted to `/api/v1/observations`.
    pub observations: ObservationBus,
    /// Requests running longer are cancelled and answered with 503.
    pub request_timeout: Duration,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            history_service: Arc::clone(&self.history_service),
            observations: self.observations.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<R> AppState<R>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    /// Create a new application state from a service instance.
    pub fn new(history_service: HistoryService<R>) -> Self {
        Self::from_arc(Arc::new(history_service))
    }

    /// Create a new application state from a pre-wrapped `Arc` service.
    ///
    /// Use this when the service is shared with background tasks such as the
    /// history recorder.
    pub fn from_arc(history_service: Arc<HistoryService<R>>) -> Self {
        Self {
            history_service,
            observations: ObservationBus::new(DEFAULT_OBSERVATION_CAPACITY),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Publish posted observations on `bus`, typically the one the history
    /// recorder subscribes to.
    #[must_use]
    pub fn with_observation_bus(mut self, bus: ObservationBus) -> Self {
        self.observations = bus;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
