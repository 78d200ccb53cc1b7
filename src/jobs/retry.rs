//! Transient-error retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// Retry budget for transient remote and catalog failures.
pub const MAX_ATTEMPTS: u32 = 5;
/// Base backoff; attempt `n` sleeps `BASE_BACKOFF * 2^n`.
pub const BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Errors that may clear up on their own: rate limits, server errors
/// and transport failures.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for crate::clients::pufferpanel::RemoteError {
    fn is_transient(&self) -> bool {
        self.is_transient()
    }
}

impl Transient for crate::clients::modrinth::CatalogError {
    fn is_transient(&self) -> bool {
        self.is_transient()
    }
}

/// Runs `op` until it succeeds, the error is not transient, the budget
/// is exhausted or the job is canceled. Returns the value and the number
/// of attempts spent, for step telemetry.
pub async fn retry_transient<T, E, Fut>(
    token: &CancellationToken,
    mut op: impl FnMut() -> Fut,
) -> Result<(T, u32)>
where
    E: Transient + Into<Error> + std::fmt::Display,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(Error::canceled());
        }
        match op().await {
            Ok(value) => return Ok((value, attempt + 1)),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt);
                debug!(attempt = attempt + 1, backoff_ms = backoff.as_millis() as u64, error = %err, "Transient failure, backing off");
                tokio::select! {
                    _ = token.cancelled() => return Err(Error::canceled()),
                    _ = tokio::time::sleep(backoff) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
