//! Reachability prober trait

use async_trait::async_trait;
use std::time::Duration;

use crate::error::PingError;

/// Liveness check of a host.
///
/// An unreachable host is `Ok(false)`. Errors are reserved for failures of
/// the probe itself.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, PingError>;
}
