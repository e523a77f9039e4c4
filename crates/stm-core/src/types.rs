//! Core types for the SSH terminal manager

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result of one command string run on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// The command string as submitted
    pub command: String,
    /// When the command finished
    pub timestamp: Instant,
    /// Output lines, in order
    pub stdout: Vec<String>,
    /// Error lines, in order. Always empty for interactive shells, where
    /// both streams share one terminal.
    pub stderr: Vec<String>,
    /// Exit code, `-1` when the server reported none
    pub code: i32,
}

impl CommandOutput {
    /// Create an output stamped with the current time
    pub fn new(command: impl Into<String>, stdout: Vec<String>, stderr: Vec<String>, code: i32) -> Self {
        Self {
            command: command.into(),
            timestamp: Instant::now(),
            stdout,
            stderr,
            code,
        }
    }

    /// Whether the command exited with code 0
    pub fn succeeded(&self) -> bool {
        self.code == 0
    }
}

/// High-level intent issued by the caller and tracked until it completes or expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    TurnOn,
    TurnOff,
    Restart,
    Connect,
}

impl RequestKind {
    /// Default lifetime of a pending request of this kind
    pub fn default_timeout(self) -> Duration {
        match self {
            RequestKind::TurnOn => Duration::from_secs(60),
            RequestKind::TurnOff | RequestKind::Restart | RequestKind::Connect => {
                Duration::from_secs(30)
            }
        }
    }

    /// Snake case name, as used in configuration and logs
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::TurnOn => "turn_on",
            RequestKind::TurnOff => "turn_off",
            RequestKind::Restart => "restart",
            RequestKind::Connect => "connect",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid MAC address text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid MAC address: {0}")]
pub struct MacAddressError(pub String);

/// Hardware address of the host's network interface, used for Wake-on-LAN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacAddressError;

    /// Accepts `:` or `-` separated octets, or twelve bare hex digits
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| !matches!(c, ':' | '-')).collect();
        if digits.len() != 12 || !digits.is_ascii() {
            return Err(MacAddressError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| MacAddressError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeouts() {
        assert_eq!(RequestKind::TurnOn.default_timeout(), Duration::from_secs(60));
        assert_eq!(RequestKind::Restart.default_timeout(), Duration::from_secs(30));
        assert_eq!(RequestKind::Connect.to_string(), "connect");
    }

    #[test]
    fn test_mac_address_formats() {
        let colon: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let dash: MacAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        let bare: MacAddress = "aabbccddeeff".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon, bare);
        assert_eq!(colon.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_mac_address_invalid() {
        assert!("aa:bb:cc".parse::<MacAddress>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddress>().is_err());
        assert!("é:bb:cc:dd:ee:f".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_address_serde() {
        #[derive(Deserialize)]
        struct Host {
            mac: MacAddress,
        }
        let host: Host = serde_json::from_str(r#"{"mac":"01:02:03:04:05:06"}"#).unwrap();
        assert_eq!(host.mac.bytes(), &[1, 2, 3, 4, 5, 6]);
    }
}
