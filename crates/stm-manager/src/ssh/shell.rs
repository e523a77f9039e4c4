//! Interactive shell mode
//!
//! Each line of the script is typed into a pseudo-terminal shell and
//! followed by the exit marker command; the whole transcript is parsed once
//! the shell exits.

use std::time::Duration;

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tokio::time::Instant;

use stm_core::error::ExecutionError;
use stm_core::types::CommandOutput;
use stm_shell::{detect_platform, Platform, Script, ECHO_COMMAND, EXIT_COMMAND};

use super::handler::ClientHandler;

const TERM: &str = "vt100";
const PTY_ROWS: u32 = 24;

pub(crate) async fn run_shell(
    handle: &Handle<ClientHandler>,
    script: &Script,
    timeout: Duration,
) -> Result<CommandOutput, ExecutionError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ExecutionError::Channel(e.to_string()))?;

    let result = drive(&mut channel, script, timeout).await;
    if result.is_err() {
        let _ = channel.close().await;
    }
    result
}

async fn drive(
    channel: &mut Channel<Msg>,
    script: &Script,
    timeout: Duration,
) -> Result<CommandOutput, ExecutionError> {
    let deadline = Instant::now() + timeout;

    channel
        .request_pty(false, TERM, script.pty_width(), PTY_ROWS, 0, 0, &[])
        .await
        .map_err(|e| ExecutionError::Channel(e.to_string()))?;
    channel
        .request_shell(false)
        .await
        .map_err(|e| ExecutionError::Channel(e.to_string()))?;

    let mut raw = Vec::new();
    let platform = loop {
        if let Some(platform) = detect_platform(&raw) {
            break platform;
        }
        match recv(channel, deadline, timeout).await? {
            Some(data) => raw.extend_from_slice(&data),
            None => {
                return Err(ExecutionError::Read(
                    "shell closed before printing a prompt".to_string(),
                ))
            }
        }
    };
    if platform == Platform::Cmd {
        tracing::debug!("cmd.exe detected, pausing between commands");
    }

    for line in script.lines() {
        send_line(channel, line, platform).await?;
        send_line(channel, ECHO_COMMAND, platform).await?;
    }
    send(channel, EXIT_COMMAND).await?;

    while let Some(data) = recv(channel, deadline, timeout).await? {
        raw.extend_from_slice(&data);
    }

    let output = script.parse_output(&raw);
    Ok(CommandOutput::new(
        script.text(),
        output.stdout,
        Vec::new(),
        output.code,
    ))
}

async fn send(channel: &Channel<Msg>, line: &str) -> Result<(), ExecutionError> {
    let input = format!("{}\r", line);
    channel
        .data(input.as_bytes())
        .await
        .map_err(|e| ExecutionError::Send(e.to_string()))
}

async fn send_line(
    channel: &Channel<Msg>,
    line: &str,
    platform: Platform,
) -> Result<(), ExecutionError> {
    send(channel, line).await?;
    if let Some(delay) = platform.settle_delay() {
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

/// Next chunk of terminal output, or `None` once the shell is gone
async fn recv(
    channel: &mut Channel<Msg>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Option<Vec<u8>>, ExecutionError> {
    loop {
        let msg = tokio::time::timeout_at(deadline, channel.wait())
            .await
            .map_err(|_| ExecutionError::ShellTimeout(timeout))?;

        match msg {
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                return Ok(Some(data.to_vec()))
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
            Some(_) => {}
        }
    }
}
