//! Cached outputs of the commands polled on a host

use tokio::time::Instant;

use stm_core::config::SensorCommand;
use stm_core::types::CommandOutput;

/// Command run when nothing else is due, to check that the session works
pub const TEST_COMMAND: &str = "echo ''";

#[derive(Debug, Clone)]
struct Entry {
    command: SensorCommand,
    output: Option<CommandOutput>,
    last_run: Option<Instant>,
}

/// Polled commands with their last outputs
#[derive(Debug, Clone, Default)]
pub struct CommandCache {
    entries: Vec<Entry>,
}

impl CommandCache {
    pub fn new(commands: impl IntoIterator<Item = SensorCommand>) -> Self {
        Self {
            entries: commands
                .into_iter()
                .map(|command| Entry {
                    command,
                    output: None,
                    last_run: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn command(&self, index: usize) -> Option<&SensorCommand> {
        self.entries.get(index).map(|entry| &entry.command)
    }

    /// Indices of the commands to run now.
    ///
    /// `force` selects all of them, `once` only those that never ran.
    /// Otherwise a command is due when it never ran or its interval elapsed.
    pub fn due(&self, force: bool, once: bool) -> Vec<usize> {
        let now = Instant::now();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                if force {
                    return true;
                }
                match (entry.last_run, entry.command.interval) {
                    (None, _) => true,
                    (Some(_), _) if once => false,
                    (Some(_), None) => true,
                    (Some(last), Some(interval)) => now.duration_since(last) >= interval,
                }
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Store the output of a command that ran
    pub fn record(&mut self, index: usize, output: CommandOutput) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.last_run = Some(output.timestamp);
            entry.output = Some(output);
        }
    }

    /// Last output of a command string
    pub fn output(&self, command: &str) -> Option<&CommandOutput> {
        self.entries
            .iter()
            .find(|entry| entry.command.command == command)
            .and_then(|entry| entry.output.as_ref())
    }

    /// All stored outputs, in configuration order
    pub fn outputs(&self) -> impl Iterator<Item = &CommandOutput> {
        self.entries.iter().filter_map(|entry| entry.output.as_ref())
    }

    /// Forget every output so all commands run again on the next update
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.output = None;
            entry.last_run = None;
        }
    }
}
