//! Exit marker line
//!
//! After every command line the session writes [`ECHO_COMMAND`]. Each shell
//! dialect expands the variables it knows and leaves the others as literal
//! text or empty, so the echoed line carries the exit status regardless of
//! whether the remote shell is `sh`, bash, zsh, `cmd.exe` or PowerShell:
//!
//! | field | variable         | shell                        |
//! |-------|------------------|------------------------------|
//! | 1     | `$LastExitCode`  | PowerShell                   |
//! | 2     | `$?`             | POSIX, PowerShell            |
//! | 3     | `%errorlevel%`   | `cmd.exe`                    |
//! | 4     | `$PIPESTATUS`    | bash (first pipeline stage)  |
//! | 5     | `$pipestatus`    | zsh (every stage)            |
//!
//! The command must stay plain POSIX: dash and busybox `sh` reject array
//! subscripts such as `${PIPESTATUS[*]}` and would print no marker at all.

/// Prefix of every marker line printed by the shell
pub const END_MARKER: &str = "__exit_code__";

/// Separator between the marker fields
pub const FIELD_SEPARATOR: char = '|';

/// Command written after every command line
pub const ECHO_COMMAND: &str =
    r#"echo "__exit_code__|$LastExitCode|$?|%errorlevel%|$PIPESTATUS|$pipestatus""#;

/// Command written after the last marker to end the shell session
pub const EXIT_COMMAND: &str = "exit";

/// Number of `|`-separated fields in a well-formed marker line
pub const MARKER_FIELDS: usize = 6;

/// Index of the first pipe-status field
const PIPE_STATUS_FIELD: usize = 4;

/// Check whether a normalized output line is a marker line.
///
/// `cmd.exe` echoes the surrounding quotes, so a leading `"` is accepted.
pub fn is_marker(line: &str) -> bool {
    line.strip_prefix('"').unwrap_or(line).starts_with(END_MARKER)
}

/// Decode the exit code carried by a marker line.
///
/// The first non-zero field wins. `False` (PowerShell's `$?`) counts as 1 and
/// `True` as 0; text left unexpanded by the other dialects is skipped. Pipe
/// status arrays are only consulted with `consult_pipe_status`, and then the
/// rightmost failing stage is taken, matching `pipefail`.
///
/// A line with an unexpected number of fields decodes to 0.
pub fn decode_exit_code(line: &str, consult_pipe_status: bool) -> i32 {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != MARKER_FIELDS {
        tracing::trace!("Malformed exit marker with {} fields: {:?}", fields.len(), line);
        return 0;
    }

    if let Some(code) = fields[1..PIPE_STATUS_FIELD]
        .iter()
        .filter_map(|field| decode_field(field))
        .find(|code| *code != 0)
    {
        return code;
    }

    if !consult_pipe_status {
        return 0;
    }

    fields[PIPE_STATUS_FIELD..]
        .iter()
        .filter_map(|field| decode_pipe_status(field))
        .find(|code| *code != 0)
        .unwrap_or(0)
}

fn clean(field: &str) -> &str {
    field.trim().trim_matches('"').trim()
}

fn decode_field(field: &str) -> Option<i32> {
    match clean(field) {
        "" => None,
        "True" => Some(0),
        "False" => Some(1),
        value => value.parse().ok(),
    }
}

fn decode_pipe_status(field: &str) -> Option<i32> {
    clean(field)
        .split_whitespace()
        .filter_map(|stage| stage.parse::<i32>().ok())
        .rev()
        .find(|code| *code != 0)
}
