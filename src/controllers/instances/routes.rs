use axum::Router;
use axum::routing::{get, post};

use crate::controllers::instances::handlers::{
	create_instance, delete_instance, enqueue_resync, enqueue_sync, get_instance_by_id,
	get_instances, sync_instances, update_instance, validate_instance,
};
use crate::domain::app_state::AppState;

pub fn instance_routes() -> Router<AppState> {
	Router::new().nest(
		"/instances",
		Router::new()
			.route("/", get(get_instances).post(create_instance))
			.route("/validate", post(validate_instance))
			.route("/sync", post(sync_instances))
			.route(
				"/{id}",
				get(get_instance_by_id)
					.put(update_instance)
					.delete(delete_instance),
			)
			.route("/{id}/sync", post(enqueue_sync))
			.route("/{id}/resync", post(enqueue_resync)),
	)
}
