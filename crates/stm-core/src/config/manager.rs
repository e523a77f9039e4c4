//! Per-host manager configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;
use crate::types::{MacAddress, RequestKind};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default reachability probe timeout
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(4);

/// Default timeout for opening and authenticating a session
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(4);

/// Default timeout of a single command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration of one managed host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Host name or address
    pub host: String,

    /// Display name used in logs, defaults to the host
    pub name: Option<String>,

    /// SSH port
    pub port: u16,

    /// User to log in as
    pub username: String,

    /// Password, tried after public key authentication
    pub password: Option<String>,

    /// Private key used for public key authentication
    pub key_filename: Option<PathBuf>,

    /// Known hosts file that trusted keys are read from and learned into
    pub host_keys_filename: Option<PathBuf>,

    /// Trust and record keys of hosts that are not known yet
    pub add_host_keys: bool,

    /// Also trust keys in the user's `~/.ssh/known_hosts`
    pub load_system_host_keys: bool,

    /// Run commands through an interactive shell instead of exec channels
    pub invoke_shell: bool,

    /// Open a session for each command instead of keeping one open
    pub disconnect_mode: bool,

    /// Whether `turn_off` may be used
    pub allow_turn_off: bool,

    /// Network interface address used to wake the host
    pub mac_address: Option<MacAddress>,

    /// Command that powers the host off
    pub turn_off_command: Option<String>,

    /// Command that restarts the host
    pub restart_command: Option<String>,

    #[serde(with = "duration_secs")]
    pub ping_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub ssh_timeout: Duration,

    /// Timeout of commands that do not set their own
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Commands polled on every update
    pub commands: Vec<SensorCommand>,

    /// Lifetime of pending requests
    pub request_timeouts: RequestTimeouts,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            name: None,
            port: DEFAULT_PORT,
            username: whoami::username(),
            password: None,
            key_filename: None,
            host_keys_filename: None,
            add_host_keys: false,
            load_system_host_keys: false,
            invoke_shell: false,
            disconnect_mode: false,
            allow_turn_off: false,
            mac_address: None,
            turn_off_command: None,
            restart_command: None,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            ssh_timeout: DEFAULT_SSH_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            commands: Vec::new(),
            request_timeouts: RequestTimeouts::default(),
        }
    }
}

impl ManagerConfig {
    /// Configuration for a host with every other setting at its default
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Name used in logs
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }

    /// Known hosts file of the host. Learning keys without a configured file
    /// records them in [`super::default_host_keys_path`].
    pub fn host_keys_path(&self) -> Option<PathBuf> {
        match &self.host_keys_filename {
            Some(path) => Some(path.clone()),
            None if self.add_host_keys => Some(super::default_host_keys_path()),
            None => None,
        }
    }

    /// Check settings that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host".to_string()));
        }
        if self.username.is_empty() {
            return Err(ConfigError::MissingField("username".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}: port must not be 0",
                self.display_name()
            )));
        }
        if let Some(command) = self.commands.iter().find(|c| c.command.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "{}: empty command string (interval {:?})",
                self.display_name(),
                command.interval
            )));
        }
        Ok(())
    }
}

/// A command polled on the host, with its own schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorCommand {
    /// Command string, possibly spanning several lines
    pub command: String,

    /// Minimum time between runs. Without one the command runs on every update.
    #[serde(
        default,
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<Duration>,

    /// Overrides the host's command timeout
    #[serde(
        default,
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl SensorCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            interval: None,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// How long each kind of pending request is kept before it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestTimeouts {
    #[serde(with = "duration_secs")]
    pub turn_on: Duration,
    #[serde(with = "duration_secs")]
    pub turn_off: Duration,
    #[serde(with = "duration_secs")]
    pub restart: Duration,
    #[serde(with = "duration_secs")]
    pub connect: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            turn_on: RequestKind::TurnOn.default_timeout(),
            turn_off: RequestKind::TurnOff.default_timeout(),
            restart: RequestKind::Restart.default_timeout(),
            connect: RequestKind::Connect.default_timeout(),
        }
    }
}

impl RequestTimeouts {
    /// Lifetime of a request of the given kind
    pub fn get(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::TurnOn => self.turn_on,
            RequestKind::TurnOff => self.turn_off,
            RequestKind::Restart => self.restart,
            RequestKind::Connect => self.connect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::new("nas.local");
        assert_eq!(config.port, 22);
        assert_eq!(config.ping_timeout, Duration::from_secs(4));
        assert_eq!(config.ssh_timeout, Duration::from_secs(4));
        assert!(!config.add_host_keys);
        assert!(!config.invoke_shell);
        assert!(!config.disconnect_mode);
        assert!(!config.allow_turn_off);
        assert_eq!(config.display_name(), "nas.local");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: ManagerConfig = toml::from_str(
            r#"
            host = "192.168.1.20"
            name = "nas"
            username = "admin"
            invoke_shell = true
            mac_address = "00:11:22:33:44:55"
            ssh_timeout = 2.5

            [request_timeouts]
            turn_on = 120

            [[commands]]
            command = "uptime"
            interval = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.display_name(), "nas");
        assert!(config.invoke_shell);
        assert_eq!(config.ssh_timeout, Duration::from_millis(2500));
        assert_eq!(config.request_timeouts.get(RequestKind::TurnOn), Duration::from_secs(120));
        assert_eq!(config.request_timeouts.get(RequestKind::Restart), Duration::from_secs(30));
        assert_eq!(
            config.commands,
            vec![SensorCommand::new("uptime").with_interval(Duration::from_secs(30))]
        );
        assert_eq!(config.mac_address.map(|m| m.to_string()).as_deref(), Some("00:11:22:33:44:55"));
    }

    #[test]
    fn test_host_keys_path() {
        let mut config = ManagerConfig::new("nas");
        assert_eq!(config.host_keys_path(), None);

        config.add_host_keys = true;
        assert_eq!(config.host_keys_path(), Some(crate::config::default_host_keys_path()));

        config.host_keys_filename = Some(PathBuf::from("/etc/stm/known_hosts"));
        assert_eq!(config.host_keys_path(), Some(PathBuf::from("/etc/stm/known_hosts")));
    }

    #[test]
    fn test_validate_missing_host() {
        assert!(matches!(
            ManagerConfig::default().validate(),
            Err(ConfigError::MissingField(field)) if field == "host"
        ));
    }

    #[test]
    fn test_validate_empty_command() {
        let mut config = ManagerConfig::new("nas");
        config.commands.push(SensorCommand::new("  "));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
