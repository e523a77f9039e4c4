//! SSH sessions to managed hosts

mod exec;
mod handler;
mod host_keys;
mod session;
mod shell;
mod worker;

pub use handler::{ClientHandler, HandlerError};
pub use host_keys::{ensure_host_keys_file, HostKeyPolicy};
pub use session::SshSession;
pub use worker::SessionWorker;
