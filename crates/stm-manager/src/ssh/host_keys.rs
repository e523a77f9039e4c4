//! Trusted host keys

use russh_keys::key::PublicKey;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Which known hosts files are consulted and whether new keys are learned
#[derive(Debug, Clone, Default)]
pub struct HostKeyPolicy {
    /// Known hosts file owned by the manager
    pub file: Option<PathBuf>,
    /// Also consult `~/.ssh/known_hosts`
    pub system: bool,
    /// Record keys of hosts that are not in any file yet
    pub learn: bool,
}

/// Outcome of looking a server key up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Known,
    Unknown,
    /// A different key is recorded for the host
    Changed { line: usize },
}

impl HostKeyPolicy {
    /// Look the key up in the configured files
    pub fn check(&self, host: &str, port: u16, key: &PublicKey) -> io::Result<KeyStatus> {
        if let Some(path) = &self.file {
            match russh_keys::check_known_hosts_path(host, port, key, path) {
                Ok(true) => return Ok(KeyStatus::Known),
                Ok(false) => {}
                Err(russh_keys::Error::KeyChanged { line }) => {
                    return Ok(KeyStatus::Changed { line })
                }
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
            }
        }

        if self.system {
            match russh_keys::check_known_hosts(host, port, key) {
                Ok(true) => return Ok(KeyStatus::Known),
                Ok(false) => {}
                Err(russh_keys::Error::KeyChanged { line }) => {
                    return Ok(KeyStatus::Changed { line })
                }
                // A missing ~/.ssh/known_hosts is not an error
                Err(e) => tracing::debug!("System known hosts unreadable: {}", e),
            }
        }

        Ok(KeyStatus::Unknown)
    }

    /// Record a key in the manager's known hosts file
    pub fn learn(&self, host: &str, port: u16, key: &PublicKey) -> io::Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        russh_keys::learn_known_hosts_path(host, port, key, path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

/// Create the known hosts file if it does not exist, without touching its content
pub fn ensure_host_keys_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().append(true).create(true).open(path)?;
    Ok(())
}
