//! Shell protocol error types

use thiserror::Error;

/// Errors raised while preparing a script for an interactive shell
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    /// The command string has no non-blank lines
    #[error("Command string is empty")]
    EmptyScript,

    /// A command line contains the exit marker and would confuse the parser
    #[error("Command line contains the reserved marker: {0}")]
    ReservedMarker(String),
}
