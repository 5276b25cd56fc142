//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use hubhist_domain::error::{HistoryError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

/// Maps [`HistoryError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(pub(crate) HistoryError);

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(HistoryError::InvalidParameters(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let (status, message) = match &self.0 {
            HistoryError::InvalidParameters(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            HistoryError::SeriesLockTimeout { .. } | HistoryError::Cancelled => {
                tracing::warn!(error = %self.0, "history request not served");
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string())
            }
            HistoryError::MalformedToken { .. }
            | HistoryError::UnsupportedToken { .. }
            | HistoryError::CorruptLog { .. }
            | HistoryError::Storage(_) => {
                tracing::error!(error = %self.0, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                kind,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_validation_to_bad_request() {
        let response = ApiError::from(ValidationError::InvertedRange).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn should_map_corruption_to_internal_error() {
        let response = ApiError::from(HistoryError::CorruptLog { offset: 4 }).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn should_map_contention_to_service_unavailable() {
        let timeout = HistoryError::SeriesLockTimeout {
            series: "a.b".to_string(),
        };
        assert_eq!(
            ApiError::from(timeout).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(HistoryError::Cancelled).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
