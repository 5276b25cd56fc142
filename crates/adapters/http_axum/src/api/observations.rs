//! Observation intake: posted observations go onto the observation bus.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use hubhist_app::ports::{IntervalRepository, ObservationPublisher};
use hubhist_domain::observation::Observation;
use hubhist_domain::time::now;

use crate::api::history::{parse_timestamp, report_value};
use crate::error::ApiError;
use crate::state::AppState;

/// One status change reported by an integration.
#[derive(Debug, Deserialize)]
pub struct ObservationBody {
    pub component_uid: String,
    pub status_uid: String,
    pub value: serde_json::Value,
    pub timestamp: Option<String>,
}

/// `POST /api/v1/observations`
///
/// Answers 202 once the observation is on the bus; the history recorder
/// stores it asynchronously.
pub async fn publish<R>(
    State(state): State<AppState<R>>,
    Json(body): Json<ObservationBody>,
) -> Result<StatusCode, ApiError>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    let timestamp = body
        .timestamp
        .as_deref()
        .map(parse_timestamp)
        .transpose()?
        .unwrap_or_else(now);
    let observation = Observation::builder()
        .component_uid(body.component_uid)
        .status_uid(body.status_uid)
        .value(report_value(body.value))
        .timestamp(timestamp)
        .build()?;

    state.observations.publish(observation).await?;
    Ok(StatusCode::ACCEPTED)
}
