use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use secrecy::ExposeSecret;
use tracing::{instrument, warn};

use crate::domain::app_state::AppState;
use crate::{Error, Result};

/// Bearer-token middleware for the API surface.
///
/// Active only when `ADMIN_TOKEN` is configured; without it the server
/// runs open, which is the expected mode behind a trusted reverse proxy.
#[instrument(skip_all)]
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let Some(expected) = &state.settings.env.admin_token else {
        return Ok(next.run(request).await);
    };

    let bearer = request.headers().typed_get::<Authorization<Bearer>>();
    match bearer {
        Some(bearer) if constant_time_eq(bearer.token(), expected.expose_secret()) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!("Rejected request with invalid bearer token");
            Err(Error::unauthorized("invalid bearer token"))
        }
        None => {
            warn!("Rejected request without bearer token");
            Err(Error::unauthorized("missing bearer token"))
        }
    }
}

/// Comparison that does not leak the match length through timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().min(b.len()) {
        diff |= (a[i] ^ b[i]) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn compares_exact_strings_only() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secre"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }
}
