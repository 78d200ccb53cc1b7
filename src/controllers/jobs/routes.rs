use axum::Router;
use axum::routing::{get, post};

use crate::controllers::jobs::handlers::{cancel_job, get_job, job_events, retry_job};
use crate::domain::app_state::AppState;

pub fn job_routes() -> Router<AppState> {
	Router::new().nest(
		"/jobs",
		Router::new()
			.route("/{id}", get(get_job).delete(cancel_job))
			.route("/{id}/events", get(job_events))
			.route("/{id}/retry", post(retry_job)),
	)
}
