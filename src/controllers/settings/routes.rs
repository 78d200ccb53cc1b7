use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::controllers::settings::handlers::{
	delete_secret, pufferpanel_test, put_secret, secret_status,
};
use crate::domain::app_state::AppState;
use crate::net::csrf::csrf_middleware;

pub fn settings_routes() -> Router<AppState> {
	let secret_routes = Router::new()
		.route("/{type}", post(put_secret).delete(delete_secret))
		.route("/{type}/status", get(secret_status))
		.layer(middleware::from_fn(csrf_middleware));

	Router::new()
		.nest("/settings/secret", secret_routes)
		.route("/pufferpanel/test", post(pufferpanel_test))
}
