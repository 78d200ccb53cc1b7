use axum::extract::Path;
use axum::{Json, debug_handler};
use secrecy::SecretString;
use tracing::{info, instrument, warn};

use crate::clients::pufferpanel::{HttpPufferClient, PufferClient};
use crate::controllers::settings::models::{
    OkBody, PufferTestBody, PufferTestPayload, SecretPayload, SecretStatusBody,
};
use crate::db;
use crate::domain::app_state::AppState;
use crate::{Error, Result};

const SECRET_KINDS: &[&str] = &["pufferpanel", "modrinth"];

fn check_kind(kind: &str) -> Result<()> {
    if SECRET_KINDS.contains(&kind) {
        Ok(())
    } else {
        Err(Error::bad_request(format!("unknown secret type {kind}")))
    }
}

fn check_rate(state: &AppState) -> Result<()> {
    state.secret_limiter.check().map_err(|_| {
        warn!("Secret endpoint rate limit exceeded");
        Error::too_many_requests("secret writes are limited, slow down")
    })
}

#[instrument(skip(state, payload))]
#[debug_handler(state = AppState)]
pub(super) async fn put_secret(
    state: AppState,
    Path(kind): Path<String>,
    Json(payload): Json<SecretPayload>,
) -> Result<Json<OkBody>> {
    check_rate(&state)?;
    check_kind(&kind)?;
    if payload.value.is_empty() {
        return Err(Error::bad_request("secret value must not be empty"));
    }

    let mut conn = state.db_pool.get()?;
    db::secrets::upsert(&mut conn, &kind, &payload.value)?;
    // Secrets never reach the log; the tail is enough for operators.
    info!(kind, last4 = %db::secrets::last4(&payload.value), "Secret stored");
    Ok(Json(OkBody { ok: true }))
}

#[instrument(skip(state))]
#[debug_handler(state = AppState)]
pub(super) async fn delete_secret(
    state: AppState,
    Path(kind): Path<String>,
) -> Result<Json<OkBody>> {
    check_rate(&state)?;
    check_kind(&kind)?;

    let mut conn = state.db_pool.get()?;
    let removed = db::secrets::delete(&mut conn, &kind)?;
    info!(kind, removed, "Secret deleted");
    Ok(Json(OkBody { ok: true }))
}

#[instrument(skip(state))]
#[debug_handler(state = AppState)]
pub(super) async fn secret_status(
    state: AppState,
    Path(kind): Path<String>,
) -> Result<Json<SecretStatusBody>> {
    check_kind(&kind)?;
    let mut conn = state.db_pool.get()?;
    let last4 = db::secrets::status(&mut conn, &kind)?;
    Ok(Json(SecretStatusBody {
        configured: last4.is_some(),
        last4,
    }))
}

/// Builds a throwaway client from the posted credentials and lists the
/// remote's servers to prove they work.
#[instrument(skip(payload))]
#[debug_handler(state = AppState)]
pub(super) async fn pufferpanel_test(
    Json(payload): Json<PufferTestPayload>,
) -> Result<Json<PufferTestBody>> {
    if payload.base_url.is_empty() {
        return Err(Error::bad_request("base_url must not be empty"));
    }
    let client = HttpPufferClient::new(
        &payload.base_url,
        &payload.client_id,
        SecretString::from(payload.client_secret),
    );
    let servers = client.list_servers().await.map_err(Error::from)?;
    info!(servers = servers.len(), "Control-plane credentials verified");
    Ok(Json(PufferTestBody {
        ok: true,
        servers: servers.len(),
    }))
}
