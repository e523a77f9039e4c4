//! stm-manager: SSH terminal manager runtime
//!
//! Probes hosts, keeps SSH sessions to them through a worker task per host,
//! polls commands over exec channels or interactive shells, and wakes,
//! powers off or restarts hosts on request.

pub mod backoff;
pub mod commands;
pub mod manager;
pub mod ping;
pub mod ssh;
pub mod wol;

pub use backoff::ExponentialBackoff;
pub use commands::{CommandCache, TEST_COMMAND};
pub use manager::{HostManager, UpdateOptions};
pub use ping::Ping;
pub use ssh::SessionWorker;
