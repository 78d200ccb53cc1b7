//! Application state management module.
//!
//! Provides the shared state handed to every request handler: the
//! database pool, the scheduler engine, the remote/catalog capability
//! clients, the secret-endpoint rate limiter and the immutable settings.
//! Everything is wrapped in [`Arc`] for safe sharing across tasks.

use std::fmt::{self, Formatter};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, State};
use derive_more::Deref;
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::clients::modrinth::CatalogClient;
use crate::clients::pufferpanel::PufferClient;
use crate::configuration::Settings;
use crate::db::DbPool;
use crate::jobs::engine::{Engine, EngineRunner};

/// Writes to the secret-store endpoints are capped at this rate.
const SECRET_WRITES_PER_SECOND: u32 = 5;

/// Thread-safe shared handle to the database connection pool.
pub type AppPool = Arc<DbPool>;

impl FromRef<AppState> for AppPool {
	fn from_ref(state: &AppState) -> Self {
		Arc::clone(&state.db_pool)
	}
}

/// Thread-safe shared handle to the scheduler engine.
pub type AppEngine = Arc<Engine>;

impl FromRef<AppState> for AppEngine {
	fn from_ref(state: &AppState) -> Self {
		Arc::clone(&state.engine)
	}
}

pub type SecretLimiter = RateLimiter<
	governor::state::NotKeyed,
	governor::state::InMemoryState,
	governor::clock::DefaultClock,
>;

/// Core application state shared across all request handlers.
#[derive(Clone)]
pub struct App {
	/// Shared database connection pool
	pub db_pool: AppPool,
	/// Scheduler engine; the single owner of all job state
	pub engine: AppEngine,
	/// Remote control-plane client
	pub remote: Arc<dyn PufferClient>,
	/// Upstream catalog client
	pub catalog: Arc<dyn CatalogClient>,
	/// Token bucket guarding secret-store writes
	pub secret_limiter: Arc<SecretLimiter>,
	/// Global application settings
	pub settings: Settings,
}

impl fmt::Debug for App {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let db_state = self.db_pool.state();
		f.debug_struct("App").field("db_pool", &db_state).finish()
	}
}

impl App {
	/// Constructs the app state around an existing pool and client pair.
	/// Returns the engine runner, which the caller must spawn.
	pub fn with_parts(
		db_pool: AppPool,
		remote: Arc<dyn PufferClient>,
		catalog: Arc<dyn CatalogClient>,
		settings: Settings,
		shutdown: CancellationToken,
	) -> (Self, EngineRunner) {
		let (engine, runner) = Engine::new(
			(*db_pool).clone(),
			Arc::clone(&remote),
			Arc::clone(&catalog),
			&settings.scheduler,
			shutdown,
		);
		let quota = Quota::per_second(NonZeroU32::new(SECRET_WRITES_PER_SECOND).unwrap());
		let app = Self {
			db_pool,
			engine,
			remote,
			catalog,
			secret_limiter: Arc::new(RateLimiter::direct(quota)),
			settings,
		};
		(app, runner)
	}
}

/// Thread-safe wrapper around the application state for axum integration.
///
/// Implements axum's `FromRequestParts` so handlers can extract shared
/// state directly; derefs transparently to `App`.
#[derive(Clone, FromRequestParts, Deref)]
#[from_request(via(State))]
pub struct AppState(pub Arc<App>);
