//! russh client handler enforcing the host key policy

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use thiserror::Error;

use super::host_keys::{HostKeyPolicy, KeyStatus};

/// Errors raised while the transport is being set up
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Ssh(#[from] russh::Error),

    /// The server key is in no trusted file and learning is disabled
    #[error("Unknown host key for {host} ({fingerprint})")]
    HostKeyUnknown { host: String, fingerprint: String },

    /// The server key differs from the recorded one
    #[error("Host key for {host} changed (known hosts line {line})")]
    HostKeyChanged { host: String, line: usize },

    #[error("Failed to access known hosts: {0}")]
    KnownHosts(#[from] std::io::Error),
}

/// SSH client handler for one host
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = HandlerError;

    /// Verify the server's host key against the known hosts files
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("{}: server host key {}", self.host, fingerprint);

        match self.policy.check(&self.host, self.port, server_public_key)? {
            KeyStatus::Known => Ok(true),
            KeyStatus::Changed { line } => Err(HandlerError::HostKeyChanged {
                host: self.host.clone(),
                line,
            }),
            KeyStatus::Unknown if self.policy.learn => {
                tracing::info!("{}: learning host key {}", self.host, fingerprint);
                self.policy.learn(&self.host, self.port, server_public_key)?;
                Ok(true)
            }
            KeyStatus::Unknown => Err(HandlerError::HostKeyUnknown {
                host: self.host.clone(),
                fingerprint,
            }),
        }
    }
}
