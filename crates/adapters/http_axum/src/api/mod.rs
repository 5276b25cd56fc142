//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod history;
#[allow(clippy::missing_errors_doc)]
pub mod observations;

use axum::Router;
use axum::routing::{get, post};

use hubhist_app::ports::IntervalRepository;

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<R>() -> Router<AppState<R>>
where
    R: IntervalRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/v1/history", axum::routing::delete(history::delete::<R>))
        .route("/v1/history/row_count", get(history::row_count::<R>))
        .route(
            "/v1/history/statistics",
            get(history::statistics::<R>).delete(history::reset_statistics::<R>),
        )
        .route(
            "/v1/history/{component_uid}/{status_uid}",
            get(history::extract::<R>).post(history::report::<R>),
        )
        .route("/v1/observations", post(observations::publish::<R>))
}
