//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::manager::ManagerConfig;
use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration of the `stm-manager` daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Time between update ticks of each host
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Backoff applied after connection faults
    pub backoff: BackoffConfig,

    /// Managed hosts
    #[serde(rename = "host")]
    pub hosts: Vec<ManagerConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            hosts: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Validate the backoff and every host, and reject duplicate names
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::MissingField("host".to_string()));
        }
        self.backoff.validate()?;

        let mut names = HashSet::new();
        for host in &self.hosts {
            host.validate()?;
            if !names.insert(host.display_name()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate host name: {}",
                    host.display_name()
                )));
            }
        }
        Ok(())
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Reject values the delay computation cannot handle
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "backoff.jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        if self.initial.is_zero() || self.max < self.initial {
            return Err(ConfigError::Invalid(
                "backoff.max must be at least backoff.initial, which must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
