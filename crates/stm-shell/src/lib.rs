//! stm-shell: Exit-marker protocol for interactive SSH shells
//!
//! Over a pseudo-terminal stdout and stderr share one byte stream, typed
//! input is echoed back between the output lines and there is no exit-status
//! channel. This crate builds the marker lines that are written after every
//! command and recovers per-command output and the exit code from the raw
//! bytes read back from the shell.

pub mod detect;
pub mod error;
pub mod marker;
pub mod normalize;
pub mod parser;
pub mod script;

pub use detect::{detect_platform, Platform, CMD_BANNER, CMD_PREAMBLE, CMD_SETTLE_DELAY};
pub use error::ShellError;
pub use marker::{decode_exit_code, is_marker, ECHO_COMMAND, END_MARKER, EXIT_COMMAND};
pub use normalize::normalize;
pub use parser::{ShellOutput, ShellParser};
pub use script::Script;
