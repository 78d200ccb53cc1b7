pub mod assets;
pub mod auth;
pub mod csrf;
pub mod request_id;
pub mod router;
pub mod server;
