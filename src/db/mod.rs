pub mod aliases;
pub mod connection;
pub mod events;
pub mod instances;
pub mod migrations;
pub mod mod_updates;
pub mod mods;
pub mod secrets;
pub mod sync_jobs;

pub use connection::{DbConn, DbPool};
