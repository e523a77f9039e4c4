//! Terminal output normalization

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    /// OSC window title (`ESC ] 0 ; title BEL`), emitted by `cmd.exe` and PowerShell
    window_title: Regex,
    /// Cursor moved to column 1 of a row; conpty uses it instead of a newline
    row_start: Regex,
    /// Any other CSI or two-byte escape sequence
    ansi_escape: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        window_title: Regex::new(r"\x1b\]0;.*?\x07").expect("valid window title pattern"),
        row_start: Regex::new(r"\x1b\[\d+;1H").expect("valid cursor pattern"),
        ansi_escape: Regex::new(r"\x1b(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])")
            .expect("valid escape pattern"),
    })
}

/// Turn raw pseudo-terminal output into plain text lines.
///
/// Escape sequences, carriage returns, backspaces and NUL bytes are removed.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn normalize(raw: &[u8]) -> Vec<String> {
    let patterns = patterns();
    let text = String::from_utf8_lossy(raw);
    let text = patterns.window_title.replace_all(&text, "");
    let text = patterns.row_start.replace_all(&text, "\n");
    let text = patterns.ansi_escape.replace_all(&text, "");

    text.replace(['\x08', '\r', '\0'], "")
        .lines()
        .map(str::to_string)
        .collect()
}
