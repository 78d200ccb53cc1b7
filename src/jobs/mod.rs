//! Durable job scheduling and execution.
//!
//! The [`engine::Engine`] owns all mutable scheduler state (queues,
//! semaphores, progress, cancellation) and is the only entry point for
//! enqueueing, canceling and observing jobs. Executors live in
//! [`sync`] and [`update`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clients::modrinth::CatalogClient;
use crate::clients::pufferpanel::PufferClient;
use crate::db::DbPool;

pub mod engine;
pub mod progress;
pub mod retry;
pub mod sync;
pub mod update;

pub use engine::Engine;

/// Everything an executor needs to do its work: the store and the two
/// remote capability interfaces.
#[derive(Clone)]
pub struct ExecutorContext {
    pub pool: DbPool,
    pub remote: Arc<dyn PufferClient>,
    pub catalog: Arc<dyn CatalogClient>,
}

/// Public identifier of a scheduled job. Sync and update jobs live in
/// separate tables, so the public id carries the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    Sync(i64),
    Update(i64),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Sync(id) => write!(f, "sync-{id}"),
            JobId::Update(id) => write!(f, "update-{id}"),
        }
    }
}

impl FromStr for JobId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(raw) = s.strip_prefix("sync-") {
            return raw.parse().map(JobId::Sync).map_err(|_| ());
        }
        if let Some(raw) = s.strip_prefix("update-") {
            return raw.parse().map(JobId::Update).map_err(|_| ());
        }
        Err(())
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| serde::de::Error::custom("invalid job id"))
    }
}
