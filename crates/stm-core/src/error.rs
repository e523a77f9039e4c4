//! Error types for the SSH terminal manager

use std::path::PathBuf;
use std::time::Duration;

use stm_shell::ShellError;
use thiserror::Error;

/// Top-level error for manager operations
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A connection or execution fault
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Turning on needs a MAC address
    #[error("No MAC address set")]
    NoMacAddress,

    /// Turning off is disabled for this host
    #[error("Turning off is not allowed")]
    TurnOffNotAllowed,

    /// No command is configured for the power action
    #[error("No {0} command configured")]
    ActionNotConfigured(&'static str),

    /// Sending the magic packet failed
    #[error("Wake on LAN failed: {0}")]
    WakeOnLan(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Category of a [`Fault`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Offline,
    HostKeyUnknown,
    Authentication,
    Connect,
    Execution,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FaultKind::Offline => "offline",
            FaultKind::HostKeyUnknown => "host_key_unknown",
            FaultKind::Authentication => "authentication",
            FaultKind::Connect => "connect",
            FaultKind::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// Failure to reach, connect to or run commands on a host
#[derive(Error, Debug)]
pub enum Fault {
    /// Host is not reachable or is shutting down
    #[error("{0}")]
    Offline(String),

    /// The server presented a key that is not trusted
    #[error("Host key is unknown: {0}")]
    HostKeyUnknown(String),

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport level failure while connecting
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Failure while running a command
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl Fault {
    /// Category of this fault
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::Offline(_) => FaultKind::Offline,
            Fault::HostKeyUnknown(_) => FaultKind::HostKeyUnknown,
            Fault::Authentication(_) => FaultKind::Authentication,
            Fault::Connect(_) => FaultKind::Connect,
            Fault::Execution(_) => FaultKind::Execution,
        }
    }

    /// Authentication faults, including untrusted host keys, need operator action
    pub fn is_auth(&self) -> bool {
        matches!(self, Fault::HostKeyUnknown(_) | Fault::Authentication(_))
    }
}

/// Failure while running a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// No session is open
    #[error("Not connected")]
    NotConnected,

    /// Opening or configuring a channel failed
    #[error("Channel error: {0}")]
    Channel(String),

    /// Writing to the channel failed
    #[error("Failed to send input: {0}")]
    Send(String),

    /// The channel or session closed unexpectedly
    #[error("Failed to read output: {0}")]
    Read(String),

    /// The command string cannot be driven through a shell
    #[error("Invalid command string: {0}")]
    Script(#[from] ShellError),

    /// A command in exec mode did not finish in time
    #[error("Timeout during command after {0:?}")]
    Timeout(Duration),

    /// An interactive shell did not finish in time
    #[error("Timeout during interactive shell command after {0:?}")]
    ShellTimeout(Duration),
}

impl ExecutionError {
    /// Whether the error is a timeout of either mode
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_) | ExecutionError::ShellTimeout(_))
    }

    /// Whether the session must be torn down after this error.
    ///
    /// Exec mode timeouts only close the channel's input side, and a
    /// rejected script never reached the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExecutionError::Timeout(_) | ExecutionError::Script(_))
    }
}

/// Failure of a reachability probe
#[derive(Error, Debug)]
pub enum PingError {
    /// The probe could not be started or awaited
    #[error("Failed to run ping: {0}")]
    Io(#[from] std::io::Error),

    /// The ping utility reported an error rather than an unanswered echo
    #[error("Ping exited with code {0}")]
    ExitCode(i32),

    /// Raw socket failure
    #[error("ICMP error: {0}")]
    Icmp(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
