//! Router configuration module that sets up the application's HTTP
//! routing and middleware stack.
//!
//! This module is responsible for:
//! - Configuring middleware layers for request processing
//! - Setting up request ID generation and propagation
//! - Establishing request tracing and logging
//! - Bearer authentication for the API surface
//! - Defining the application's route structure

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer as TowerCatchPanicLayer;
use tower_http::compression::CompressionLayer as TowerCompressionLayer;
use tower_http::cors::CorsLayer as TowerCorsLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer as TowerTraceLayer;
use tracing::{error, info_span};

use crate::controllers::routes::{
	dashboard_routes, instance_routes, job_routes, mod_routes, settings_routes,
};
use crate::domain::app_state::AppState;
use crate::net::auth::auth_middleware;
use crate::net::request_id::{MakeRequestUlid, REQUEST_ID_HEADER, with_request_id};
use crate::net::assets;

/// Initialises and configures the application router with all necessary
/// middleware and routes.
pub fn init(state: AppState) -> Router {
	let middleware_stack = ServiceBuilder::new()
		.layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUlid))
		.layer(
			TowerTraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
				// Log the request id as generated.
				let request_id = request.headers().get(REQUEST_ID_HEADER);

				match request_id {
					Some(request_id) => info_span!(
						"http_request",
						request_id = ?request_id,
						method = %request.method(),
						path = %request.uri().path(),
					),
					None => {
						error!("could not extract request_id");
						info_span!(
							"http_request",
							method = %request.method(),
							path = %request.uri().path(),
						)
					}
				}
			}),
		)
		.layer(middleware::from_fn(with_request_id))
		.layer(TowerCatchPanicLayer::new())
		.layer(TowerCorsLayer::permissive())
		.layer(TowerCompressionLayer::new())
		.layer(TimeoutLayer::with_status_code(
			StatusCode::REQUEST_TIMEOUT,
			Duration::from_secs(30),
		))
		.layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER));

	let api_routes = Router::new()
		.merge(instance_routes())
		.merge(mod_routes())
		.merge(job_routes())
		.merge(dashboard_routes())
		.merge(settings_routes())
		.layer(middleware::from_fn_with_state(
			state.clone(),
			auth_middleware,
		));

	Router::new()
		.nest("/api", api_routes)
		.merge(assets::routes(&state))
		.layer(middleware_stack)
		.with_state(state)
}
