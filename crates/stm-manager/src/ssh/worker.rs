//! Session worker task
//!
//! The [`SshSession`] is owned by one task per host. Callers send it requests
//! over a channel, so the transport only ever sees one operation at a time
//! and the caller's task never blocks on socket I/O.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use stm_core::config::ManagerConfig;
use stm_core::error::{ExecutionError, Fault};
use stm_core::traits::Terminal;
use stm_core::types::CommandOutput;

use super::session::SshSession;

/// Requests queued for one host. A handful is plenty since every caller
/// waits for its reply.
const REQUEST_CHANNEL_CAPACITY: usize = 8;

enum Request {
    LoadHostKeys(oneshot::Sender<Result<(), Fault>>),
    Connect(oneshot::Sender<Result<(), Fault>>),
    Disconnect(oneshot::Sender<()>),
    IsConnected(oneshot::Sender<bool>),
    Execute {
        command: String,
        timeout: Duration,
        reply: oneshot::Sender<Result<CommandOutput, ExecutionError>>,
    },
}

/// [`Terminal`] backed by a task that owns the SSH session
pub struct SessionWorker {
    name: String,
    tx: mpsc::Sender<Request>,
}

impl SessionWorker {
    /// Spawn the worker task on the current tokio runtime.
    ///
    /// The task closes the session and exits once the worker is dropped.
    pub fn spawn(config: ManagerConfig) -> Self {
        let name = config.display_name().to_string();
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(run(SshSession::new(config), rx));
        Self { name, tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(build(reply)).await.is_err() {
            tracing::warn!("{}: session worker stopped", self.name);
            return None;
        }
        rx.await.ok()
    }
}

async fn run(mut session: SshSession, mut rx: mpsc::Receiver<Request>) {
    while let Some(request) = rx.recv().await {
        match request {
            Request::LoadHostKeys(reply) => {
                let _ = reply.send(session.load_host_keys());
            }
            Request::Connect(reply) => {
                let _ = reply.send(session.connect().await);
            }
            Request::Disconnect(reply) => {
                session.disconnect().await;
                let _ = reply.send(());
            }
            Request::IsConnected(reply) => {
                let _ = reply.send(session.is_connected());
            }
            Request::Execute {
                command,
                timeout,
                reply,
            } => {
                let _ = reply.send(session.execute(&command, timeout).await);
            }
        }
    }
    session.disconnect().await;
}

fn worker_gone() -> Fault {
    Fault::Connect("Session worker stopped".to_string())
}

#[async_trait]
impl Terminal for SessionWorker {
    async fn load_host_keys(&self) -> Result<(), Fault> {
        self.request(Request::LoadHostKeys)
            .await
            .unwrap_or_else(|| Err(worker_gone()))
    }

    async fn connect(&self) -> Result<(), Fault> {
        self.request(Request::Connect)
            .await
            .unwrap_or_else(|| Err(worker_gone()))
    }

    async fn disconnect(&self) {
        self.request(Request::Disconnect).await;
    }

    async fn is_connected(&self) -> bool {
        self.request(Request::IsConnected).await.unwrap_or(false)
    }

    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError> {
        let command = command.to_string();
        self.request(|reply| Request::Execute {
            command,
            timeout,
            reply,
        })
        .await
        .unwrap_or_else(|| Err(ExecutionError::Read("Session worker stopped".to_string())))
    }
}
