//! SSH terminal manager daemon
//!
//! Keeps every configured host's state up to date: probes it, keeps its SSH
//! session open and polls its commands until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stm_core::config::{self, DaemonConfig};
use stm_core::error::Fault;
use stm_core::types::CommandOutput;
use stm_core::HostState;
use stm_manager::{ExponentialBackoff, HostManager, UpdateOptions};

#[derive(Parser)]
#[command(name = "stm-manager")]
#[command(about = "Monitors hosts over SSH and keeps their sessions alive")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run a single strict update per host, print the states as JSON and exit
    #[arg(long)]
    once: bool,

    /// Command string to run on every host after the update (implies --once)
    #[arg(long)]
    exec: Option<String>,
}

/// Outcome of a one-shot run on one host
#[derive(Serialize)]
struct HostReport {
    name: String,
    state: HostState,
    fault: Option<String>,
    outputs: Vec<OutputReport>,
}

#[derive(Serialize)]
struct OutputReport {
    command: String,
    code: i32,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl From<&CommandOutput> for OutputReport {
    fn from(output: &CommandOutput) -> Self {
        Self {
            command: output.command.clone(),
            code: output.code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let daemon: DaemonConfig = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    daemon.validate().context("Invalid configuration")?;

    let mut managers = daemon
        .hosts
        .iter()
        .cloned()
        .map(HostManager::new)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to create host managers")?;

    if args.once || args.exec.is_some() {
        let reports = futures::future::join_all(
            managers
                .iter_mut()
                .map(|manager| run_once(manager, args.exec.as_deref())),
        )
        .await;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    tracing::info!("Managing {} host(s)", managers.len());

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down...");
        }
        ctrl_c.cancel();
    });

    futures::future::join_all(
        managers
            .into_iter()
            .map(|manager| run_host(manager, &daemon, shutdown.clone())),
    )
    .await;

    Ok(())
}

async fn run_once(manager: &mut HostManager, exec: Option<&str>) -> HostReport {
    let mut fault = manager.update(UpdateOptions::strict()).await.err();
    let mut outputs: Vec<OutputReport> = manager.commands().outputs().map(Into::into).collect();

    if let (Some(command), None) = (exec, &fault) {
        match manager.execute_command_string(command, None).await {
            Ok(output) => outputs.push((&output).into()),
            Err(e) => fault = Some(e),
        }
    }
    manager.close().await;

    HostReport {
        name: manager.name().to_string(),
        state: manager.state(),
        fault: fault.map(|f| f.to_string()),
        outputs,
    }
}

/// Update loop of one host.
///
/// Offline hosts and failed commands are retried on the next poll; connection
/// faults back off; authentication faults stop the loop until the
/// configuration is fixed.
async fn run_host(mut manager: HostManager, daemon: &DaemonConfig, shutdown: CancellationToken) {
    let mut backoff = ExponentialBackoff::from_config(&daemon.backoff);
    let options = UpdateOptions {
        test: true,
        raise_errors: true,
        ..UpdateOptions::default()
    };

    loop {
        let delay = match manager.update(options).await {
            Ok(()) => {
                backoff.reset();
                daemon.poll_interval
            }
            Err(fault) if fault.is_auth() => {
                tracing::error!(
                    "{}: {}. Not retrying until the configuration changes",
                    manager.name(),
                    fault
                );
                break;
            }
            Err(fault @ Fault::Connect(_)) => {
                let delay = backoff.next_delay();
                tracing::warn!("{}: {}. Retrying in {:?}", manager.name(), fault, delay);
                delay
            }
            Err(fault) => {
                tracing::debug!("{}: {}", manager.name(), fault);
                daemon.poll_interval
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    manager.close().await;
}
