//! Command scripts for interactive shells

use crate::error::ShellError;
use crate::marker::{ECHO_COMMAND, END_MARKER};
use crate::parser::{ShellOutput, ShellParser};

/// Columns added to the longest written line when sizing the terminal.
///
/// Leaves room for the prompt so echoed lines are not wrapped.
pub const PTY_WIDTH_MARGIN: u32 = 200;

/// A command string split into the lines written to an interactive shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    text: String,
    lines: Vec<String>,
}

impl Script {
    /// Split a command string into shell input lines.
    ///
    /// Blank lines are dropped, since their echo cannot be told apart from
    /// empty output lines.
    pub fn new(text: impl Into<String>) -> Result<Self, ShellError> {
        let text = text.into();
        let lines: Vec<String> = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        if lines.is_empty() {
            return Err(ShellError::EmptyScript);
        }
        if let Some(line) = lines.iter().find(|line| line.contains(END_MARKER)) {
            return Err(ShellError::ReservedMarker(line.clone()));
        }

        Ok(Self { text, lines })
    }

    /// The command string as submitted
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lines written to the shell, each followed by the marker command
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Terminal width wide enough for every written line
    pub fn pty_width(&self) -> u32 {
        let longest = self
            .lines
            .iter()
            .map(|line| line.chars().count())
            .chain(std::iter::once(ECHO_COMMAND.len()))
            .max()
            .unwrap_or_default();
        longest as u32 + PTY_WIDTH_MARGIN
    }

    /// Parse the transcript read back from the shell
    pub fn parse_output(&self, raw: &[u8]) -> ShellOutput {
        ShellParser::new(&self.lines).parse(raw)
    }
}
