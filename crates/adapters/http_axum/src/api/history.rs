//! JSON handlers for status history.

use std::future::Future;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hubhist_app::ports::IntervalRepository;
use hubhist_app::services::history_service::UpdateStatistics;
use hubhist_domain::error::{HistoryError, ValidationError};
use hubhist_domain::extract::{DataType, Extract, ExtractRequest};
use hubhist_domain::interval::{RowCount, SeriesFilter, UpdateOutcome};
use hubhist_domain::observation::{Observation, SeriesKey};
use hubhist_domain::time::{Timestamp, now};

use crate::error::ApiError;
use crate::state::AppState;

/// Default number of data points per extract.
const DEFAULT_MAX_ROW_COUNT: usize = 10_000;

/// Default time range: last 24 hours.
const DEFAULT_HOURS: i64 = 24;

/// Query parameters for the extract endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractParams {
    /// Start of time range (RFC 3339). Defaults to 24 hours before the end.
    pub range_start: Option<String>,
    /// End of time range (RFC 3339). Defaults to now.
    pub range_end: Option<String>,
    /// Sampling interval, in seconds or `HH:MM:SS`. Number extracts only.
    pub interval: Option<String>,
    /// `text` (default) or `number`.
    pub data_type: Option<String>,
    pub max_row_count: Option<usize>,
    pub fill_value: Option<String>,
}

/// Query parameters shared by delete and row count.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub component_uid: Option<String>,
    pub status_uid: Option<String>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
}

impl FilterParams {
    fn into_filter(self) -> Result<SeriesFilter, ApiError> {
        Ok(SeriesFilter {
            component_uid: self.component_uid,
            status_uid: self.status_uid,
            range_start: self.range_start.as_deref().map(parse_timestamp).transpose()?,
            range_end: self.range_end.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Body of a report: a JSON string, number or boolean, and an optional
/// RFC 3339 timestamp (defaults to now).
#[derive(Debug, Deserialize)]
pub struct ReportBody {
    pub value: serde_json::Value,
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted_shards: usize,
}

/// Parse an RFC 3339 timestamp string, returning a validation error on failure.
pub(crate) fn parse_timestamp(value: &str) -> Result<Timestamp, ValidationError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(|_| ValidationError::InvalidTimestamp(value.to_owned()))
}

/// Parse a sampling interval given as whole seconds or `HH:MM:SS`.
fn parse_interval(value: &str) -> Result<TimeDelta, ValidationError> {
    let invalid = || ValidationError::InvalidInterval(value.to_owned());

    if let Ok(seconds) = value.parse::<i64>() {
        return TimeDelta::try_seconds(seconds).ok_or_else(invalid);
    }

    let mut parts = value.split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let hours: i64 = hours.parse().map_err(|_| invalid())?;
    let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: i64 = seconds.parse().map_err(|_| invalid())?;
    if !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return Err(invalid());
    }
    hours
        .checked_mul(3_600)
        .and_then(|total| total.checked_add(minutes * 60 + seconds))
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(invalid)
}

pub(crate) fn report_value(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Run `operation` with a cancellation token that fires when the request
/// exceeds `timeout` or the handler future is dropped.
async fn run_bounded<T, F, Fut>(timeout: Duration, operation: F) -> Result<T, ApiError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, HistoryError>>,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    match tokio::time::timeout(timeout, operation(cancel.clone())).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            cancel.cancel();
            Err(HistoryError::Cancelled.into())
        }
    }
}

/// `GET /api/v1/history/{component_uid}/{status_uid}?range_start=&range_end=&interval=&data_type=&max_row_count=`
pub async fn extract<R>(
    State(state): State<AppState<R>>,
    Path((component_uid, status_uid)): Path<(String, String)>,
    Query(params): Query<ExtractParams>,
) -> Result<Json<Extract>, ApiError>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    let series = SeriesKey::new(component_uid, status_uid)?;
    let range_end = params
        .range_end
        .as_deref()
        .map(parse_timestamp)
        .transpose()?
        .unwrap_or_else(now);
    let range_start = params
        .range_start
        .as_deref()
        .map(parse_timestamp)
        .transpose()?
        .unwrap_or_else(|| range_end - TimeDelta::hours(DEFAULT_HOURS));
    let data_type = params
        .data_type
        .as_deref()
        .map(str::parse::<DataType>)
        .transpose()?
        .unwrap_or_default();
    let interval = params.interval.as_deref().map(parse_interval).transpose()?;

    let request = ExtractRequest {
        series,
        range_start,
        range_end,
        interval,
        data_type,
        max_row_count: params.max_row_count.unwrap_or(DEFAULT_MAX_ROW_COUNT),
        fill_value: params.fill_value,
    };

    let service = &state.history_service;
    let extract = run_bounded(state.request_timeout, |cancel| {
        service.build_extract(request, cancel)
    })
    .await?;

    Ok(Json(extract))
}

/// `POST /api/v1/history/{component_uid}/{status_uid}`
///
/// Not bounded by the request timeout: a write that has started always
/// completes, so the response reflects what was stored.
pub async fn report<R>(
    State(state): State<AppState<R>>,
    Path((component_uid, status_uid)): Path<(String, String)>,
    Json(body): Json<ReportBody>,
) -> Result<Json<ReportResponse>, ApiError>
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
        .component_uid(component_uid)
        .status_uid(status_uid)
        .value(report_value(body.value))
        .timestamp(timestamp)
        .build()?;

    let outcome = state.history_service.report(observation).await?;

    Ok(Json(ReportResponse { outcome }))
}

/// `DELETE /api/v1/history?component_uid=&status_uid=&range_start=&range_end=`
pub async fn delete<R>(
    State(state): State<AppState<R>>,
    Query(params): Query<FilterParams>,
) -> Result<Json<DeleteResponse>, ApiError>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    let filter = params.into_filter()?;
    let service = &state.history_service;
    let deleted_shards =
        run_bounded(state.request_timeout, |cancel| service.delete(filter, cancel)).await?;

    Ok(Json(DeleteResponse { deleted_shards }))
}

/// `GET /api/v1/history/row_count?component_uid=&status_uid=&range_start=&range_end=`
pub async fn row_count<R>(
    State(state): State<AppState<R>>,
    Query(params): Query<FilterParams>,
) -> Result<Json<RowCount>, ApiError>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    let filter = params.into_filter()?;
    let service = &state.history_service;
    let row_count =
        run_bounded(state.request_timeout, |cancel| service.row_count(filter, cancel)).await?;

    Ok(Json(row_count))
}

/// `GET /api/v1/history/statistics`
pub async fn statistics<R>(State(state): State<AppState<R>>) -> Json<UpdateStatistics>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    Json(state.history_service.statistics())
}

/// `DELETE /api/v1/history/statistics`
pub async fn reset_statistics<R>(State(state): State<AppState<R>>) -> StatusCode
where
    R: IntervalRepository + Send + Sync + 'static,
{
    state.history_service.reset_statistics();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_interval_in_seconds() {
        assert_eq!(parse_interval("300").unwrap(), TimeDelta::minutes(5));
    }

    #[test]
    fn should_parse_interval_as_clock_duration() {
        assert_eq!(parse_interval("01:30:05").unwrap(), TimeDelta::seconds(5_405));
        assert_eq!(parse_interval("00:05:00").unwrap(), TimeDelta::minutes(5));
    }

    #[test]
    fn should_reject_malformed_interval() {
        for raw in ["", "5m", "00:61:00", "1:2", "1:2:3:4"] {
            assert_eq!(
                parse_interval(raw),
                Err(ValidationError::InvalidInterval(raw.to_string())),
                "{raw}"
            );
        }
    }

    #[test]
    fn should_reject_malformed_timestamp() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ValidationError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn should_stringify_json_values() {
        assert_eq!(report_value(serde_json::json!("on")), "on");
        assert_eq!(report_value(serde_json::json!(21.5)), "21.5");
        assert_eq!(report_value(serde_json::json!(true)), "true");
        assert_eq!(report_value(serde_json::Value::Null), "");
    }

    #[tokio::test]
    async fn should_cancel_operation_on_timeout() {
        let result: Result<(), ApiError> =
            run_bounded(Duration::from_millis(10), |cancel| async move {
                cancel.cancelled().await;
                Err(HistoryError::Cancelled)
            })
            .await;

        assert!(matches!(result, Err(ApiError(HistoryError::Cancelled))));
    }
}
