//! Remote shell platform detection
//!
//! `cmd.exe` under the Windows OpenSSH server starts every session by hiding
//! the cursor, clearing the screen and homing the cursor, then prints its
//! version banner. It also drops input written while a previous command is
//! still running, so it needs a settling delay between writes.

use std::time::Duration;

/// Clear-screen sequence printed by `cmd.exe` when the session starts
pub const CMD_PREAMBLE: &[u8] = b"\x1b[?25l\x1b[2J\x1b[m\x1b[H";

/// Text expected in the first line after [`CMD_PREAMBLE`]
pub const CMD_BANNER: &str = "Microsoft Windows";

/// Delay between writes to a `cmd.exe` shell
pub const CMD_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Shell family on the remote side of an interactive channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows `cmd.exe`
    Cmd,
    /// POSIX shells and PowerShell
    Other,
}

impl Platform {
    /// Delay to wait after writing each command line
    pub fn settle_delay(self) -> Option<Duration> {
        match self {
            Platform::Cmd => Some(CMD_SETTLE_DELAY),
            Platform::Other => None,
        }
    }
}

/// Inspect the bytes a shell printed on startup.
///
/// Returns `None` while more input is needed to decide: the bytes so far are
/// a prefix of [`CMD_PREAMBLE`], or the preamble matched and the banner line
/// is not complete yet.
pub fn detect_platform(init: &[u8]) -> Option<Platform> {
    let compared = init.len().min(CMD_PREAMBLE.len());
    if init[..compared] != CMD_PREAMBLE[..compared] {
        return Some(Platform::Other);
    }
    if init.len() < CMD_PREAMBLE.len() {
        return None;
    }

    let rest = &init[CMD_PREAMBLE.len()..];
    let skipped = rest
        .iter()
        .take_while(|byte| matches!(byte, b'\r' | b'\n'))
        .count();
    let rest = &rest[skipped..];

    let line_end = rest.iter().position(|byte| matches!(byte, b'\r' | b'\n'))?;
    let line = String::from_utf8_lossy(&rest[..line_end]);

    if line.contains(CMD_BANNER) {
        Some(Platform::Cmd)
    } else {
        Some(Platform::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_start(banner: &str) -> Vec<u8> {
        let mut bytes = CMD_PREAMBLE.to_vec();
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(banner.as_bytes());
        bytes
    }

    #[test]
    fn test_preamble_length() {
        assert_eq!(CMD_PREAMBLE.len(), 16);
    }

    #[test]
    fn test_posix_prompt_decides_immediately() {
        assert_eq!(detect_platform(b"$ "), Some(Platform::Other));
        assert_eq!(detect_platform(b"Last login: Mon"), Some(Platform::Other));
    }

    #[test]
    fn test_partial_preamble_needs_more() {
        assert_eq!(detect_platform(b""), None);
        assert_eq!(detect_platform(&CMD_PREAMBLE[..5]), None);
        assert_eq!(detect_platform(CMD_PREAMBLE), None);
    }

    #[test]
    fn test_incomplete_banner_needs_more() {
        assert_eq!(detect_platform(&cmd_start("Microsoft Win")), None);
    }

    #[test]
    fn test_cmd_detected() {
        let bytes = cmd_start("Microsoft Windows [Version 10.0.19045.3803]\r\n");
        assert_eq!(detect_platform(&bytes), Some(Platform::Cmd));
        assert_eq!(Platform::Cmd.settle_delay(), Some(CMD_SETTLE_DELAY));
    }

    #[test]
    fn test_powershell_after_preamble_is_other() {
        let bytes = cmd_start("Windows PowerShell\r\n");
        assert_eq!(detect_platform(&bytes), Some(Platform::Other));
        assert_eq!(Platform::Other.settle_delay(), None);
    }
}
