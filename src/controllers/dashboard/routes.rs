use axum::Router;
use axum::routing::get;

use crate::controllers::dashboard::handlers::get_dashboard;
use crate::domain::app_state::AppState;

pub fn dashboard_routes() -> Router<AppState> {
	Router::new().route("/dashboard", get(get_dashboard))
}
