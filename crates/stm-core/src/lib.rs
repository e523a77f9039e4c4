//! stm-core: Host state, faults and configuration for the SSH terminal manager
//!
//! This crate holds the pieces shared by every host manager: the fault
//! taxonomy, the observable host state machine with its pending power
//! requests, the traits the manager drives sessions and probes through, and
//! the TOML configuration.

pub mod config;
pub mod error;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{ExecutionError, Fault, FaultKind, ManagerError, PingError};
pub use state::{Effects, HostState, StateChange, StateMachine, SubscriptionId};
pub use types::{CommandOutput, MacAddress, RequestKind};
