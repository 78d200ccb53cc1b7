//! CSRF double-submit protection for state-changing admin endpoints.
//!
//! A random token is issued as a cookie on safe requests; mutating
//! requests must echo it in the `x-csrf-token` header. Cookie and header
//! are compared verbatim.

use axum::extract::Request;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};
use rand::RngCore;
use tracing::warn;

use crate::{Error, Result};

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

pub async fn csrf_middleware(
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let safe = matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    );
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());

    if !safe {
        let header = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());
        match (cookie.as_deref(), header) {
            (Some(cookie), Some(header)) if cookie == header => {}
            _ => {
                warn!("Rejected request failing CSRF double-submit check");
                return Err(Error::forbidden("missing or mismatched CSRF token"));
            }
        }
        return Ok(next.run(request).await);
    }

    let mut response = next.run(request).await;
    if cookie.is_none() {
        let issued = Cookie::build((CSRF_COOKIE, fresh_token()))
            .path("/")
            .same_site(SameSite::Strict)
            .build();
        if let Ok(value) = HeaderValue::from_str(&issued.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    Ok(response)
}

fn fresh_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
