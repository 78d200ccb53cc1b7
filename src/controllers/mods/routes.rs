use axum::Router;
use axum::routing::{get, post};

use crate::controllers::mods::handlers::{
	apply_update, check_mod, create_mod, delete_mod, get_mods, mod_metadata, update_async,
	update_mod,
};
use crate::domain::app_state::AppState;

pub fn mod_routes() -> Router<AppState> {
	Router::new().nest(
		"/mods",
		Router::new()
			.route("/", get(get_mods).post(create_mod))
			.route("/metadata", post(mod_metadata))
			.route("/{id}", axum::routing::put(update_mod).delete(delete_mod))
			.route("/{id}/check", get(check_mod))
			.route("/{id}/update", post(apply_update))
			.route("/{id}/update-async", post(update_async)),
	)
}
