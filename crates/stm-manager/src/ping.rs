//! Reachability probing
//!
//! ICMP echo through a raw or datagram socket when the process may open one,
//! otherwise the system `ping` utility. Whether sockets can be opened is
//! decided once per address family and process.

use async_trait::async_trait;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::process::Command;
use tokio::sync::OnceCell;

use stm_core::error::PingError;
use stm_core::traits::Prober;

/// Extra time granted to the `ping` utility before it is killed
pub const WATCHDOG_GRACE: Duration = Duration::from_secs(1);

const PAYLOAD: [u8; 56] = [0; 56];

// A client's receive task lives on the runtime that created it, so these
// clients only answer on the daemon's runtime. A second runtime in the same
// process would see every echo time out.
static ICMP_V4: OnceCell<Option<Client>> = OnceCell::const_new();
static ICMP_V6: OnceCell<Option<Client>> = OnceCell::const_new();

/// Process-wide ICMP client for the address family, if sockets are permitted
async fn icmp_client(ip: &IpAddr) -> Option<Client> {
    let (cell, kind) = match ip {
        IpAddr::V4(_) => (&ICMP_V4, ICMP::V4),
        IpAddr::V6(_) => (&ICMP_V6, ICMP::V6),
    };
    cell.get_or_init(|| async move {
        match Client::new(&Config::builder().kind(kind).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::info!("ICMP sockets unavailable ({}), using the ping utility", e);
                None
            }
        }
    })
    .await
    .clone()
}

/// Default [`Prober`]
#[derive(Debug, Clone, Default)]
pub struct Ping {
    /// Never open ICMP sockets
    pub force_subprocess: bool,
}

impl Ping {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve(host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse() {
            return Some(ip);
        }
        match tokio::net::lookup_host((host, 0)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                tracing::debug!("Failed to resolve {}: {}", host, e);
                None
            }
        }
    }
}

#[async_trait]
impl Prober for Ping {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool, PingError> {
        if !self.force_subprocess {
            // A name that does not resolve belongs to a host that is not there
            let Some(ip) = Self::resolve(host).await else {
                return Ok(false);
            };
            if let Some(client) = icmp_client(&ip).await {
                return icmp_echo(&client, ip, timeout).await;
            }
        }
        subprocess_ping(host, timeout).await
    }
}

async fn icmp_echo(client: &Client, ip: IpAddr, timeout: Duration) -> Result<bool, PingError> {
    let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
    pinger.timeout(timeout);

    match pinger.ping(PingSequence(0), &PAYLOAD).await {
        Ok((_, rtt)) => {
            tracing::trace!("{} answered in {:?}", ip, rtt);
            Ok(true)
        }
        Err(SurgeError::Timeout { .. }) => Ok(false),
        Err(SurgeError::IOError(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(PingError::Icmp(format!("Permission denied: {}", e)))
        }
        Err(SurgeError::IOError(e)) => {
            // Unreachable networks surface as send errors
            tracing::debug!("ICMP echo to {} failed: {}", ip, e);
            Ok(false)
        }
        Err(e) => Err(PingError::Icmp(e.to_string())),
    }
}

/// Arguments passed to the `ping` utility
pub fn ping_args(host: &str, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
    vec![
        "-q".to_string(),
        "-c1".to_string(),
        format!("-W{}", secs),
        host.to_string(),
    ]
}

/// Map the exit code of the `ping` utility. 0 answered, 1 did not, anything
/// else is a usage or system error.
pub fn interpret_exit_code(code: Option<i32>) -> Result<bool, PingError> {
    match code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        Some(code) => Err(PingError::ExitCode(code)),
        // Killed by a signal
        None => Ok(false),
    }
}

async fn subprocess_ping(host: &str, timeout: Duration) -> Result<bool, PingError> {
    let mut command = Command::new("ping");
    command.args(ping_args(host, timeout));
    run_with_watchdog(command, timeout).await
}

/// Run a probe command, killing it once `timeout` plus [`WATCHDOG_GRACE`]
/// elapsed. A killed probe means the host did not answer.
async fn run_with_watchdog(mut command: Command, timeout: Duration) -> Result<bool, PingError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout + WATCHDOG_GRACE, child.wait()).await {
        Ok(status) => interpret_exit_code(status?.code()),
        Err(_) => {
            tracing::debug!("{:?} did not exit in time, killing it", command.as_std());
            child.kill().await?;
            Ok(false)
        }
    }
}
