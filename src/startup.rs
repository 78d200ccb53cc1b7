//! Server startup and lifecycle management module.
//!
//! Wires up the application state, recovers and starts the job
//! scheduler, launches the HTTP server and coordinates graceful
//! shutdown on system signals.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clients::modrinth::{CatalogClient, HttpCatalogClient};
use crate::clients::pufferpanel::{HttpPufferClient, PufferClient};
use crate::configuration::Settings;
use crate::db;
use crate::domain::app_state::{App, AppPool, AppState};
use crate::net::server;
use crate::Result;

/// Launches the server with the given configuration and database pool.
///
/// Builds the remote and catalog clients (secrets stored in the database
/// override the file configuration), recovers jobs left queued or
/// running by a previous process, then serves requests until a
/// termination signal arrives. The scheduler drains within its grace
/// period during shutdown.
pub async fn launch(config: Settings, pool: AppPool) -> Result<()> {
    let token = CancellationToken::new();
    let (remote, catalog) = build_clients(&config, &pool)?;
    let (app, runner) = App::with_parts(pool, remote, catalog, config, token.clone());
    let app_state = AppState(Arc::new(app));

    app_state.engine.recover().await?;
    let scheduler = tokio::spawn(runner.run());
    info!("Scheduler started!");

    let (listener, router) = server::init(app_state).await?;
    info!("Listening on {}", listener.local_addr()?);

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(token));
    info!("modwarden server started!");

    let (srv, _) = tokio::join!(server, scheduler);
    srv.map_err(|err| {
        warn!("Server error while shutting down: {:#?}", err);
        err.into()
    })
}

/// Builds the HTTP clients. A `pufferpanel` secret (JSON credentials) or
/// a `modrinth` secret (token) stored via the settings endpoints takes
/// precedence over `configuration.yaml`.
fn build_clients(
    config: &Settings,
    pool: &AppPool,
) -> Result<(Arc<dyn PufferClient>, Arc<dyn CatalogClient>)> {
    #[derive(serde::Deserialize)]
    struct StoredCreds {
        base_url: String,
        client_id: String,
        client_secret: String,
    }

    let mut conn = pool.get()?;
    let stored_pp = db::secrets::find(&mut conn, "pufferpanel")?
        .and_then(|raw| serde_json::from_str::<StoredCreds>(raw.expose_secret()).ok());
    let stored_mr = db::secrets::find(&mut conn, "modrinth")?;

    let remote: Arc<dyn PufferClient> = match stored_pp {
        Some(creds) => Arc::new(HttpPufferClient::new(
            &creds.base_url,
            &creds.client_id,
            SecretString::from(creds.client_secret),
        )),
        None => Arc::new(HttpPufferClient::new(
            &config.pufferpanel.base_url,
            &config.pufferpanel.client_id,
            config.pufferpanel.client_secret.clone(),
        )),
    };
    let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalogClient::new(
        &config.modrinth.base_url,
        stored_mr.or_else(|| config.modrinth.token()),
    ));
    Ok((remote, catalog))
}

/// Waits for Ctrl+C, SIGTERM or SIGINT, then cancels the given token so
/// the scheduler and server shut down together.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(unix)]
    let interrupt = async {
        signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(not(unix))]
    let interrupt = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => token.cancel(),
        _ = terminate => token.cancel(),
        _ = interrupt => token.cancel(),
    }

    info!("Shutting down...");
}
