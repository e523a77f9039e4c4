//! Observable host state and its transitions
//!
//! [`StateMachine`] is the only writer of a host's [`HostState`]. Every
//! outcome reported by the prober or the SSH session goes through one of the
//! `handle_*` transitions, which assign fields with [`StateMachine::set_field`]
//! and tell the caller which side effects to perform through [`Effects`].
//! Assigning a field its current value is a no-op and notifies nobody.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RequestTimeouts;
use crate::types::RequestKind;

/// Snapshot of a host's state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostState {
    /// Result of the last reachability probe
    pub online: bool,
    /// Whether an authenticated session is open
    pub connected: bool,
    /// Set when the last connect failed to authenticate, cleared on success
    pub error: bool,
    /// Pending caller intent
    pub request: Option<RequestKind>,
}

/// Assignment of one state field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Online(bool),
    Connected(bool),
    Error(bool),
    Request(Option<RequestKind>),
}

impl StateChange {
    /// Name of the assigned field
    pub fn field(&self) -> &'static str {
        match self {
            StateChange::Online(_) => "online",
            StateChange::Connected(_) => "connected",
            StateChange::Error(_) => "error",
            StateChange::Request(_) => "request",
        }
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateChange::Online(value)
            | StateChange::Connected(value)
            | StateChange::Error(value) => write!(f, "state.{} => {}", self.field(), value),
            StateChange::Request(Some(kind)) => write!(f, "state.request => {}", kind),
            StateChange::Request(None) => write!(f, "state.request => none"),
        }
    }
}

/// Side effects a transition asks the caller to perform
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Tear down the SSH session
    pub disconnect: bool,
    /// Drop cached command outputs
    pub reset_commands: bool,
}

/// Handle returned by [`StateMachine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn Fn(&StateChange, &HostState) + Send + Sync>;

/// Owner of a host's state
pub struct StateMachine {
    name: String,
    state: HostState,
    request_issued_at: Instant,
    timeouts: RequestTimeouts,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl StateMachine {
    /// Create the state of a host that is offline with nothing pending
    pub fn new(name: impl Into<String>, timeouts: RequestTimeouts) -> Self {
        Self {
            name: name.into(),
            state: HostState::default(),
            request_issued_at: Instant::now(),
            timeouts,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state snapshot
    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn online(&self) -> bool {
        self.state.online
    }

    pub fn connected(&self) -> bool {
        self.state.connected
    }

    pub fn error(&self) -> bool {
        self.state.error
    }

    pub fn request(&self) -> Option<RequestKind> {
        self.state.request
    }

    /// Whether a turn-off or restart is in progress
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self.state.request,
            Some(RequestKind::TurnOff | RequestKind::Restart)
        )
    }

    /// Register an observer called synchronously on every field change,
    /// with the state as it is right after the change
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&StateChange, &HostState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Assign a field and notify observers if the value changed.
    ///
    /// Setting a request also restarts its expiry clock. Returns whether the
    /// field changed.
    pub fn set_field(&mut self, change: StateChange) -> bool {
        let changed = match change {
            StateChange::Online(value) => replace(&mut self.state.online, value),
            StateChange::Connected(value) => replace(&mut self.state.connected, value),
            StateChange::Error(value) => replace(&mut self.state.error, value),
            StateChange::Request(value) => replace(&mut self.state.request, value),
        };
        if !changed {
            return false;
        }

        if let StateChange::Request(Some(_)) = change {
            self.request_issued_at = Instant::now();
        }

        tracing::debug!("{}: {}", self.name, change);
        for (_, observer) in &self.observers {
            observer(&change, &self.state);
        }
        true
    }

    /// Age of the pending request, if any
    pub fn request_age(&self) -> Option<Duration> {
        self.state.request.map(|_| self.request_issued_at.elapsed())
    }

    /// Update tick: clear the pending request once it outlived its timeout
    pub fn handle_update(&mut self) {
        let (Some(kind), Some(age)) = (self.state.request, self.request_age()) else {
            return;
        };
        if age > self.timeouts.get(kind) {
            tracing::debug!("{}: request {} expired", self.name, kind);
            self.set_field(StateChange::Request(None));
        }
    }

    pub fn handle_ping_success(&mut self) {
        self.set_field(StateChange::Online(true));
        if self.state.request == Some(RequestKind::TurnOn) {
            self.set_field(StateChange::Request(Some(RequestKind::Connect)));
        }
    }

    /// The host stopped answering. A connected session is dropped before the
    /// host is marked offline.
    pub fn handle_ping_error(&mut self) -> Effects {
        let effects = Effects {
            disconnect: self.state.connected,
            reset_commands: self.state.online,
        };

        self.set_field(StateChange::Connected(false));
        self.set_field(StateChange::Online(false));

        match self.state.request {
            Some(RequestKind::TurnOff) => {
                self.set_field(StateChange::Request(None));
            }
            Some(RequestKind::Restart) => {
                self.set_field(StateChange::Request(Some(RequestKind::TurnOn)));
            }
            _ => {}
        }
        effects
    }

    /// Host key rejected or credentials refused
    pub fn handle_auth_error(&mut self) -> Effects {
        self.set_field(StateChange::Error(true));
        Effects {
            disconnect: false,
            reset_commands: true,
        }
    }

    pub fn handle_connect_error(&mut self) -> Effects {
        Effects {
            disconnect: false,
            reset_commands: true,
        }
    }

    pub fn handle_connect_success(&mut self) {
        debug_assert!(self.state.online, "connected while offline");
        self.set_field(StateChange::Connected(true));
        self.set_field(StateChange::Error(false));
        if self.state.request == Some(RequestKind::Connect) {
            self.set_field(StateChange::Request(None));
        }
    }

    pub fn handle_disconnect(&mut self) {
        self.set_field(StateChange::Connected(false));
    }

    pub fn handle_execute_error(&mut self) -> Effects {
        Effects {
            disconnect: false,
            reset_commands: true,
        }
    }

    pub fn handle_turn_on(&mut self) {
        self.set_field(StateChange::Request(Some(RequestKind::TurnOn)));
    }

    pub fn handle_turn_off(&mut self) {
        self.set_field(StateChange::Request(Some(RequestKind::TurnOff)));
    }

    pub fn handle_restart(&mut self) {
        self.set_field(StateChange::Request(Some(RequestKind::Restart)));
    }

    pub fn handle_connect_request(&mut self) {
        self.set_field(StateChange::Request(Some(RequestKind::Connect)));
    }

    /// The manager is closing: the session is gone and the host is treated as offline
    pub fn handle_close(&mut self) {
        self.set_field(StateChange::Connected(false));
        self.set_field(StateChange::Online(false));
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
