pub mod clients;
pub mod configuration;
pub mod controllers;
pub mod db;
pub mod detect;
pub mod domain;
pub mod jarscan;
pub mod jobs;
pub mod net;
pub mod schema;
pub mod startup;
pub mod telemetry;

// re-export for ease of use in tests and binaries
pub use domain::error::{Error, ErrorKind, Result};
