//! Terminal trait

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{ExecutionError, Fault};
use crate::types::CommandOutput;

/// An SSH session to one host.
///
/// Calls on one terminal are serialized by the implementation; the
/// underlying transport never sees two operations at once.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Make sure the host key file exists and read trusted keys
    async fn load_host_keys(&self) -> Result<(), Fault>;

    /// Open and authenticate the session. Succeeds at once when already
    /// connected. Fails with [`Fault::HostKeyUnknown`],
    /// [`Fault::Authentication`] or [`Fault::Connect`], and leaves the
    /// transport closed when it does.
    async fn connect(&self) -> Result<(), Fault>;

    /// Close the session. Safe to call when not connected.
    async fn disconnect(&self);

    /// Whether a session is open
    async fn is_connected(&self) -> bool;

    /// Run a command string and collect its output
    async fn execute(&self, command: &str, timeout: Duration)
        -> Result<CommandOutput, ExecutionError>;
}
