//! Static front-end serving with the production content-security policy.
//!
//! The index document is served with a per-request nonce in production:
//! the nonce lands both in the CSP header and in a
//! `<meta name="csp-nonce">` tag the front-end reads.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use rand::RngCore;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::domain::app_state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let dir = std::path::Path::new(&state.settings.server.static_dir).join("assets");
    Router::new()
        .nest_service("/assets", ServeDir::new(dir))
        .fallback(get(serve_index))
}

async fn serve_index(State(state): State<AppState>) -> Response {
    let path = std::path::Path::new(&state.settings.server.static_dir).join("index.html");
    let Ok(mut body) = tokio::fs::read_to_string(&path).await else {
        debug!(path = %path.display(), "Index document missing");
        return (StatusCode::NOT_FOUND, "front-end assets not built").into_response();
    };

    if !state.settings.env.production {
        return Html(body).into_response();
    }

    let nonce = fresh_nonce();
    let meta = format!("<meta name=\"csp-nonce\" content=\"{nonce}\">");
    if let Some(head_end) = body.find("</head>") {
        body.insert_str(head_end, &meta);
    } else {
        body.insert_str(0, &meta);
    }

    let mut response = Html(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&csp_header(&nonce, remote_host(state.settings.pufferpanel.base_url.as_str()).as_deref())) {
        response
            .headers_mut()
            .insert(header::CONTENT_SECURITY_POLICY, value);
    }
    response
}

fn csp_header(nonce: &str, remote_host: Option<&str>) -> String {
    let connect = match remote_host {
        Some(host) => format!("'self' {host}"),
        None => "'self'".to_string(),
    };
    format!(
        "default-src 'self'; frame-ancestors 'none'; base-uri 'none'; \
         style-src-elem 'self' 'nonce-{nonce}'; style-src-attr 'unsafe-inline'; \
         connect-src {connect}; img-src 'self' data: https:"
    )
}

fn remote_host(base_url: &str) -> Option<String> {
    if base_url.is_empty() {
        return None;
    }
    let rest = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))?;
    let host = rest.split('/').next()?;
    let scheme = if base_url.starts_with("https://") {
        "https"
    } else {
        "http"
    };
    Some(format!("{scheme}://{host}"))
}

fn fresh_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
