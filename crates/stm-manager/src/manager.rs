//! Host manager
//!
//! [`HostManager`] drives one host: it probes reachability, keeps (or, in
//! disconnect mode, opens per command) the SSH session, polls the configured
//! commands and carries out power actions. Outcomes are fed to the host's
//! [`StateMachine`]; the manager performs the side effects it asks for.
//!
//! Methods take `&mut self`, so operations on one host never overlap.

use std::time::Duration;

use stm_core::config::ManagerConfig;
use stm_core::error::{ConfigError, ExecutionError, Fault, ManagerError};
use stm_core::state::{Effects, HostState, StateChange, StateMachine, SubscriptionId};
use stm_core::traits::{Prober, Terminal};
use stm_core::types::{CommandOutput, MacAddress, RequestKind};

use crate::commands::{CommandCache, TEST_COMMAND};
use crate::ping::Ping;
use crate::ssh::SessionWorker;
use crate::wol;

/// Options of an update tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Run every command, due or not
    pub force: bool,
    /// Only run commands that never ran
    pub once: bool,
    /// Run the test command when no command is due
    pub test: bool,
    /// Return offline and connection faults instead of logging them
    pub raise_errors: bool,
}

impl UpdateOptions {
    /// Options of a one-shot strict update
    pub fn strict() -> Self {
        Self {
            force: true,
            once: false,
            test: true,
            raise_errors: true,
        }
    }
}

/// Manager of one remote host
pub struct HostManager {
    config: ManagerConfig,
    state: StateMachine,
    terminal: Box<dyn Terminal>,
    prober: Box<dyn Prober>,
    commands: CommandCache,
    mac_address: Option<MacAddress>,
    host_keys_loaded: bool,
}

impl HostManager {
    /// Manager using an SSH session worker and the ICMP prober.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: ManagerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let terminal = SessionWorker::spawn(config.clone());
        Ok(Self::with_parts(config, Box::new(terminal), Box::new(Ping::new())))
    }

    /// Manager with the given terminal and prober
    pub fn with_parts(
        config: ManagerConfig,
        terminal: Box<dyn Terminal>,
        prober: Box<dyn Prober>,
    ) -> Self {
        let state = StateMachine::new(config.display_name(), config.request_timeouts);
        let commands = CommandCache::new(config.commands.iter().cloned());
        let mac_address = config.mac_address;
        Self {
            config,
            state,
            terminal,
            prober,
            commands,
            mac_address,
            host_keys_loaded: false,
        }
    }

    pub fn name(&self) -> &str {
        self.config.display_name()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current state snapshot
    pub fn state(&self) -> HostState {
        self.state.state()
    }

    /// Observe state changes
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&StateChange, &HostState) + Send + Sync + 'static,
    {
        self.state.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    pub fn commands(&self) -> &CommandCache {
        &self.commands
    }

    pub fn mac_address(&self) -> Option<MacAddress> {
        self.mac_address
    }

    /// Set the address used by [`HostManager::turn_on`], e.g. once it was
    /// read from the host
    pub fn set_mac_address(&mut self, mac: MacAddress) {
        self.mac_address = Some(mac);
    }

    /// Whether the host can take commands. In disconnect mode sessions are
    /// closed between commands, so being online is enough.
    pub fn is_up(&self) -> bool {
        if self.config.disconnect_mode {
            self.state.online() && self.state.request() != Some(RequestKind::Connect)
        } else {
            self.state.connected()
        }
    }

    pub fn is_down(&self) -> bool {
        !self.state.online()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.is_shutting_down()
    }

    async fn apply(&mut self, effects: Effects) {
        if effects.disconnect {
            self.terminal.disconnect().await;
            self.state.handle_disconnect();
        }
        if effects.reset_commands {
            self.commands.reset();
        }
    }

    /// Probe the host and record the result
    pub async fn ping(&mut self) -> Result<(), Fault> {
        let alive = match self
            .prober
            .probe(&self.config.host, self.config.ping_timeout)
            .await
        {
            Ok(alive) => alive,
            Err(e) => {
                tracing::warn!("{}: ping failed: {}", self.name(), e);
                false
            }
        };

        if alive {
            self.state.handle_ping_success();
            Ok(())
        } else {
            let effects = self.state.handle_ping_error();
            self.apply(effects).await;
            Err(Fault::Offline("Host is offline".to_string()))
        }
    }

    /// Prepare the host keys file. Only the first call does any work.
    pub async fn load_host_keys(&mut self) -> Result<(), Fault> {
        if !self.host_keys_loaded {
            self.terminal.load_host_keys().await?;
            self.host_keys_loaded = true;
        }
        Ok(())
    }

    /// Open the SSH session
    pub async fn connect(&mut self) -> Result<(), Fault> {
        if self.state.connected() {
            if self.terminal.is_connected().await {
                return Ok(());
            }
            tracing::info!("{}: session was closed by the server", self.name());
            self.state.handle_disconnect();
        }
        if !self.state.online() {
            return Err(Fault::Connect("Host is offline".to_string()));
        }
        if self.state.is_shutting_down() {
            return Err(Fault::Connect("Host is shutting down".to_string()));
        }

        self.load_host_keys().await?;

        match self.terminal.connect().await {
            Ok(()) => {
                self.state.handle_connect_success();
                Ok(())
            }
            Err(fault) => {
                let effects = if fault.is_auth() {
                    tracing::warn!("{}: {}", self.name(), fault);
                    self.state.handle_auth_error()
                } else {
                    tracing::debug!("{}: {}", self.name(), fault);
                    self.state.handle_connect_error()
                };
                self.apply(effects).await;
                Err(fault)
            }
        }
    }

    /// Close the SSH session. Safe to call when not connected.
    pub async fn disconnect(&mut self) {
        self.terminal.disconnect().await;
        self.state.handle_disconnect();
    }

    /// Run a command string on the host.
    ///
    /// In disconnect mode a session is opened for the command and closed
    /// afterwards. Without a timeout the configured command timeout applies.
    pub async fn execute_command_string(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, Fault> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);

        if self.config.disconnect_mode {
            self.connect().await?;
            let result = self.run(command, timeout).await;
            self.disconnect().await;
            return result;
        }

        if !self.state.connected() {
            return Err(ExecutionError::NotConnected.into());
        }
        self.run(command, timeout).await
    }

    async fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput, Fault> {
        match self.terminal.execute(command, timeout).await {
            Ok(output) => Ok(output),
            Err(error) => {
                tracing::debug!("{}: {:?} failed: {}", self.name(), command, error);
                if !error.is_timeout() {
                    let effects = self.state.handle_execute_error();
                    self.apply(effects).await;
                }
                if error.is_fatal() {
                    self.disconnect().await;
                }
                Err(error.into())
            }
        }
    }

    /// Run the commands that are due and store their outputs.
    ///
    /// When nothing is due and `test` is set the test command runs instead.
    /// A fault stops the pass; it is returned only with `raise_errors`.
    pub async fn update_commands(&mut self, options: UpdateOptions) -> Result<(), Fault> {
        let due = self.commands.due(options.force, options.once);

        if due.is_empty() {
            if !options.test {
                return Ok(());
            }
            return match self.execute_command_string(TEST_COMMAND, None).await {
                Ok(_) => Ok(()),
                Err(fault) => self.swallow(fault, options.raise_errors),
            };
        }

        for index in due {
            let Some(command) = self.commands.command(index).cloned() else {
                continue;
            };
            match self
                .execute_command_string(&command.command, command.timeout)
                .await
            {
                Ok(output) => self.commands.record(index, output),
                Err(fault) => return self.swallow(fault, options.raise_errors),
            }
        }
        Ok(())
    }

    fn swallow(&self, fault: Fault, raise_errors: bool) -> Result<(), Fault> {
        if raise_errors || fault.is_auth() {
            return Err(fault);
        }
        tracing::warn!("{}: {}", self.name(), fault);
        Ok(())
    }

    /// Update tick: expire the pending request, refresh reachability and the
    /// session, then poll commands
    pub async fn update(&mut self, options: UpdateOptions) -> Result<(), Fault> {
        self.state.handle_update();

        if self.state.connected() && !self.config.disconnect_mode {
            let strict = UpdateOptions {
                raise_errors: true,
                ..options
            };
            match self.update_commands(strict).await {
                Ok(()) => return Ok(()),
                Err(Fault::Execution(e)) => {
                    tracing::debug!("{}: session check failed: {}", self.name(), e);
                }
                Err(fault) => return Err(fault),
            }
        }

        if let Err(fault) = self.ping().await {
            return if options.raise_errors { Err(fault) } else { Ok(()) };
        }

        if !self.config.disconnect_mode {
            if let Err(fault) = self.connect().await {
                return self.swallow(fault, options.raise_errors);
            }
        }

        let options = UpdateOptions {
            test: options.test && !self.config.disconnect_mode,
            ..options
        };
        self.update_commands(options).await
    }

    /// Wake the host with a magic packet. Does nothing when it is online.
    pub async fn turn_on(&mut self) -> Result<(), ManagerError> {
        if self.state.online() {
            return Ok(());
        }
        let mac = self.mac_address.ok_or(ManagerError::NoMacAddress)?;
        wol::send_magic_packet(&mac)
            .await
            .map_err(|e| ManagerError::WakeOnLan(e.to_string()))?;

        tracing::info!("{}: turning on", self.name());
        self.state.handle_turn_on();
        Ok(())
    }

    /// Run the turn-off command and close the session
    pub async fn turn_off(&mut self) -> Result<CommandOutput, ManagerError> {
        if !self.config.allow_turn_off {
            return Err(ManagerError::TurnOffNotAllowed);
        }
        let command = self
            .config
            .turn_off_command
            .clone()
            .ok_or(ManagerError::ActionNotConfigured("turn_off"))?;

        let output = self.execute_command_string(&command, None).await?;
        tracing::info!("{}: turning off", self.name());
        self.disconnect().await;
        self.state.handle_turn_off();
        Ok(output)
    }

    /// Run the restart command and close the session
    pub async fn restart(&mut self) -> Result<CommandOutput, ManagerError> {
        let command = self
            .config
            .restart_command
            .clone()
            .ok_or(ManagerError::ActionNotConfigured("restart"))?;

        let output = self.execute_command_string(&command, None).await?;
        tracing::info!("{}: restarting", self.name());
        self.disconnect().await;
        self.state.handle_restart();
        Ok(output)
    }

    /// Record a pending `Connect` request and try to open the session.
    ///
    /// A failed attempt leaves the request pending, so later updates keep
    /// trying until it expires. In disconnect mode the session is closed
    /// again once it was established.
    pub async fn request_connect(&mut self) -> Result<(), Fault> {
        if self.state.connected() {
            return Ok(());
        }
        self.state.handle_connect_request();
        self.connect().await?;
        if self.config.disconnect_mode {
            self.disconnect().await;
        }
        Ok(())
    }

    /// Carry out a high-level intent issued by the caller
    pub async fn request(&mut self, kind: RequestKind) -> Result<(), ManagerError> {
        match kind {
            RequestKind::TurnOn => self.turn_on().await,
            RequestKind::TurnOff => self.turn_off().await.map(drop),
            RequestKind::Restart => self.restart().await.map(drop),
            RequestKind::Connect => Ok(self.request_connect().await?),
        }
    }

    /// Close the session and stop treating the host as online
    pub async fn close(&mut self) {
        self.disconnect().await;
        self.state.handle_close();
    }
}
