//! One SSH session to a host

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key::KeyPair;

use stm_core::config::ManagerConfig;
use stm_core::error::{ExecutionError, Fault};
use stm_core::types::CommandOutput;
use stm_shell::Script;

use super::exec::run_exec;
use super::handler::{ClientHandler, HandlerError};
use super::host_keys::{ensure_host_keys_file, HostKeyPolicy};
use super::shell::run_shell;

/// Owner of the transport to one host.
///
/// Not safe for concurrent use; [`super::SessionWorker`] serializes access.
pub struct SshSession {
    config: ManagerConfig,
    handle: Option<Handle<ClientHandler>>,
    host_keys_loaded: bool,
}

impl SshSession {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            handle: None,
            host_keys_loaded: false,
        }
    }

    fn policy(&self) -> HostKeyPolicy {
        HostKeyPolicy {
            file: self.config.host_keys_path(),
            system: self.config.load_system_host_keys,
            learn: self.config.add_host_keys,
        }
    }

    /// Create the host keys file so later lookups and appends succeed.
    /// Only the first call touches the filesystem.
    pub fn load_host_keys(&mut self) -> Result<(), Fault> {
        if self.host_keys_loaded {
            return Ok(());
        }
        if let Some(path) = &self.config.host_keys_path() {
            ensure_host_keys_file(path).map_err(|e| {
                Fault::Connect(format!("Failed to open host keys {}: {}", path.display(), e))
            })?;
            tracing::debug!("{}: host keys at {}", self.config.display_name(), path.display());
        }
        self.host_keys_loaded = true;
        Ok(())
    }

    /// Whether the transport is open
    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_closed())
    }

    /// Open and authenticate the transport
    pub async fn connect(&mut self) -> Result<(), Fault> {
        if self.is_connected() {
            return Ok(());
        }
        // Drop a transport the server closed
        self.handle = None;

        let timeout = self.config.ssh_timeout;
        // Dropping the half-open handle on timeout closes the socket
        let handle = tokio::time::timeout(timeout, self.open())
            .await
            .map_err(|_| Fault::Connect(format!("Timed out after {:?}", timeout)))??;

        tracing::info!("{}: connected", self.config.display_name());
        self.handle = Some(handle);
        Ok(())
    }

    async fn open(&self) -> Result<Handle<ClientHandler>, Fault> {
        let ssh_config = Arc::new(client::Config::default());
        let handler = ClientHandler::new(self.config.host.clone(), self.config.port, self.policy());

        tracing::debug!(
            "{}: connecting to {}:{}",
            self.config.display_name(),
            self.config.host,
            self.config.port
        );
        let mut handle = client::connect(
            ssh_config,
            (self.config.host.as_str(), self.config.port),
            handler,
        )
        .await
        .map_err(connect_fault)?;

        if let Err(fault) = self.authenticate(&mut handle).await {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(fault);
        }
        Ok(handle)
    }

    /// Public key first, then password
    async fn authenticate(&self, handle: &mut Handle<ClientHandler>) -> Result<(), Fault> {
        let user = &self.config.username;

        if let Some(path) = &self.config.key_filename {
            let key: KeyPair = russh_keys::load_secret_key(path, None).map_err(|e| {
                Fault::Authentication(format!("Failed to load key {}: {}", path.display(), e))
            })?;
            if handle
                .authenticate_publickey(user, Arc::new(key))
                .await
                .map_err(|e| Fault::Connect(e.to_string()))?
            {
                return Ok(());
            }
            tracing::debug!("{}: public key rejected", self.config.display_name());
        }

        if let Some(password) = &self.config.password {
            if handle
                .authenticate_password(user, password)
                .await
                .map_err(|e| Fault::Connect(e.to_string()))?
            {
                return Ok(());
            }
        }

        if self.config.key_filename.is_none()
            && self.config.password.is_none()
            && handle
                .authenticate_none(user)
                .await
                .map_err(|e| Fault::Connect(e.to_string()))?
        {
            return Ok(());
        }

        Err(Fault::Authentication(format!(
            "{}@{} rejected the credentials",
            user, self.config.host
        )))
    }

    /// Close the transport. Does nothing when not connected.
    pub async fn disconnect(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("{}: disconnect: {}", self.config.display_name(), e);
        }
        tracing::info!("{}: disconnected", self.config.display_name());
    }

    /// Run a command string in exec or interactive shell mode
    pub async fn execute(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError> {
        let handle = match &self.handle {
            Some(handle) if !handle.is_closed() => handle,
            _ => return Err(ExecutionError::NotConnected),
        };

        if self.config.invoke_shell {
            let script = Script::new(command)?;
            run_shell(handle, &script, timeout).await
        } else {
            run_exec(handle, command, timeout).await
        }
    }
}

fn connect_fault(error: HandlerError) -> Fault {
    match error {
        HandlerError::HostKeyUnknown { .. } | HandlerError::HostKeyChanged { .. } => {
            Fault::HostKeyUnknown(error.to_string())
        }
        HandlerError::Ssh(russh::Error::UnknownKey) => Fault::HostKeyUnknown(error.to_string()),
        HandlerError::Ssh(e) => Fault::Connect(e.to_string()),
        HandlerError::KnownHosts(e) => Fault::Connect(format!("Failed to access known hosts: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_errors_are_auth_faults() {
        let unknown = connect_fault(HandlerError::HostKeyUnknown {
            host: "nas".into(),
            fingerprint: "SHA256:abc".into(),
        });
        assert!(unknown.is_auth());

        let changed = connect_fault(HandlerError::HostKeyChanged {
            host: "nas".into(),
            line: 3,
        });
        assert!(matches!(changed, Fault::HostKeyUnknown(ref message) if message.contains("line 3")));
    }

    #[test]
    fn test_transport_errors_are_connect_faults() {
        let fault = connect_fault(HandlerError::Ssh(russh::Error::Disconnect));
        assert!(!fault.is_auth());
        assert!(matches!(fault, Fault::Connect(_)));
    }

    #[test]
    fn test_load_host_keys_creates_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        let mut config = ManagerConfig::new("nas");
        config.host_keys_filename = Some(path.clone());

        let mut session = SshSession::new(config);
        session.load_host_keys().unwrap();
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        session.load_host_keys().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_learned_keys_without_file_use_default_path() {
        let mut config = ManagerConfig::new("nas");
        config.add_host_keys = true;
        let policy = SshSession::new(config).policy();
        assert_eq!(policy.file, Some(stm_core::config::default_host_keys_path()));
        assert!(policy.learn);

        let policy = SshSession::new(ManagerConfig::new("nas")).policy();
        assert_eq!(policy.file, None);
        assert!(!policy.learn);
    }

    #[tokio::test]
    async fn test_execute_without_connect() {
        let mut session = SshSession::new(ManagerConfig::new("nas"));
        assert!(!session.is_connected());
        assert_eq!(
            session.execute("uptime", Duration::from_secs(1)).await,
            Err(ExecutionError::NotConnected)
        );
        session.disconnect().await;
    }
}
