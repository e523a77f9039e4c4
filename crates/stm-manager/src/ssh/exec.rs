//! Exec mode: one non-interactive channel per command

use std::time::Duration;

use russh::client::Handle;
use russh::ChannelMsg;
use tokio::time::Instant;

use stm_core::error::ExecutionError;
use stm_core::types::CommandOutput;

use super::handler::ClientHandler;

/// Extended data type of stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Run `command` on its own channel and collect both streams and the exit status.
///
/// On timeout only the channel's input side is closed; the session stays usable.
pub(crate) async fn run_exec(
    handle: &Handle<ClientHandler>,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, ExecutionError> {
    let deadline = Instant::now() + timeout;

    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ExecutionError::Channel(e.to_string()))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| ExecutionError::Send(e.to_string()))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut code = None;

    loop {
        let msg = match tokio::time::timeout_at(deadline, channel.wait()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                let _ = channel.eof().await;
                return Err(ExecutionError::Timeout(timeout));
            }
        };

        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                stderr.extend_from_slice(data)
            }
            ChannelMsg::ExitStatus { exit_status } => code = Some(exit_status as i32),
            ChannelMsg::Failure => {
                return Err(ExecutionError::Channel("exec request refused".to_string()))
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(CommandOutput::new(
        command,
        split_lines(&stdout),
        split_lines(&stderr),
        code.unwrap_or(-1),
    ))
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
