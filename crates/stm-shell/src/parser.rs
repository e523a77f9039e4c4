//! Recovery of command output from an interactive shell transcript

use crate::marker::{decode_exit_code, is_marker, ECHO_COMMAND, EXIT_COMMAND};
use crate::normalize::normalize;

/// Characters a shell prompt commonly ends with
const PROMPT_ENDS: [char; 4] = ['$', '#', '>', '%'];

/// Output recovered from a shell transcript
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Output lines of all commands, in order
    pub stdout: Vec<String>,
    /// First non-zero exit code reported by any marker, else 0
    pub code: i32,
}

/// Parses the transcript of a shell session driven with exit markers.
///
/// The session wrote every line of `stdin`, each followed by
/// [`ECHO_COMMAND`], and finally [`EXIT_COMMAND`]. The transcript therefore
/// interleaves echoed input (possibly behind a prompt), command output and
/// marker lines. Output of a command is the window between the echo of its
/// input line and the echo of the marker command that follows it.
pub struct ShellParser<'a> {
    stdin: &'a [String],
}

impl<'a> ShellParser<'a> {
    /// Create a parser for the given submitted lines
    pub fn new(stdin: &'a [String]) -> Self {
        Self { stdin }
    }

    /// Parse raw bytes read from the shell channel
    pub fn parse(&self, raw: &[u8]) -> ShellOutput {
        self.parse_lines(&normalize(raw))
    }

    /// Parse already normalized lines
    pub fn parse_lines(&self, lines: &[String]) -> ShellOutput {
        let consult_pipe_status = self.stdin.len() == 1;
        let mut output = ShellOutput::default();

        // Capture window of the pending command: lines[start..end]
        let mut start = 0;
        let mut end: Option<usize> = None;
        let mut stdin_index = 0;
        let mut echoed = false;

        for (i, line) in lines.iter().enumerate() {
            let Some(pending) = self.stdin.get(stdin_index) else {
                break;
            };

            if is_input_echo(line, pending) {
                start = i + 1;
                end = None;
                echoed = true;
            } else if self.is_other_input(line) {
                start = i + 1;
                end = None;
            } else if line.ends_with(ECHO_COMMAND) {
                end = Some(i);
            } else if is_marker(line) {
                let window_end = end.unwrap_or(i);
                let mut window_start = start.min(window_end);

                // No echo of the input was recognized, e.g. a prompt decoration
                // follows the command. Fall back to the first line containing it.
                if !echoed {
                    if let Some(offset) = lines[window_start..window_end]
                        .iter()
                        .position(|l| l.contains(pending.as_str()))
                    {
                        window_start += offset + 1;
                    }
                }

                output
                    .stdout
                    .extend_from_slice(&lines[window_start..window_end]);
                if output.code == 0 {
                    output.code = decode_exit_code(line, consult_pipe_status);
                }

                start = i + 1;
                end = None;
                echoed = false;
                stdin_index += 1;
            }
        }

        if stdin_index < self.stdin.len() {
            tracing::debug!(
                "Shell transcript ended after {} of {} markers",
                stdin_index,
                self.stdin.len()
            );
        }

        output
    }

    /// Echo of a submitted line other than the pending one, or of `exit`
    fn is_other_input(&self, line: &str) -> bool {
        line == EXIT_COMMAND || self.stdin.iter().any(|input| input == line)
    }
}

/// Echo of the pending input line, either bare or behind a prompt.
///
/// A suffix match only counts when the prompt ends right before it, so that
/// output such as `tools` is not mistaken for the echo of `ls`.
fn is_input_echo(line: &str, pending: &str) -> bool {
    if pending.is_empty() {
        return false;
    }
    match line.strip_suffix(pending) {
        Some("") => true,
        Some(prompt) => prompt.ends_with(|c: char| c.is_whitespace() || PROMPT_ENDS.contains(&c)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdin(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_single_command() {
        let input = stdin(&["echo hi"]);
        let output = ShellParser::new(&input).parse(b"echo hi\nhi\n__exit_code__|0|0|0|0|0\nexit\n");
        assert_eq!(output.stdout, vec!["hi"]);
        assert_eq!(output.code, 0);
    }

    #[test]
    fn test_first_failure_wins() {
        let input = stdin(&["false", "echo ok"]);
        let transcript = b"false\n\
            __exit_code__||1|%errorlevel%|1|\n\
            echo ok\n\
            ok\n\
            __exit_code__||0|%errorlevel%|0|\n\
            exit\n";
        let output = ShellParser::new(&input).parse(transcript);
        assert_eq!(output.stdout, vec!["ok"]);
        assert_eq!(output.code, 1);
    }

    #[test]
    fn test_later_failure_is_reported() {
        let input = stdin(&["true", "false"]);
        let transcript = b"true\n\
            __exit_code__||0|%errorlevel%|0|\n\
            false\n\
            __exit_code__||1|%errorlevel%|1|\n";
        assert_eq!(ShellParser::new(&input).parse(transcript).code, 1);
    }

    #[test]
    fn test_prompt_and_marker_echo() {
        let input = stdin(&["uname"]);
        let marker_echo = format!("user@host:~$ {}", ECHO_COMMAND);
        let transcript = format!(
            "Welcome\nuser@host:~$ uname\nLinux\n{}\n__exit_code__||0|%errorlevel%|0|\nuser@host:~$ exit\nlogout\n",
            marker_echo
        );
        let output = ShellParser::new(&input).parse(transcript.as_bytes());
        assert_eq!(output.stdout, vec!["Linux"]);
        assert_eq!(output.code, 0);
    }

    #[test]
    fn test_typeahead_echo_before_prompt() {
        // The tty echoes everything typed before the shell redraws the prompt
        let input = stdin(&["echo hi"]);
        let transcript = format!(
            "echo hi\n{echo}\nexit\n$ echo hi\nhi\n$ {echo}\n__exit_code__||0|%errorlevel%|0|\n$ exit\n",
            echo = ECHO_COMMAND
        );
        let output = ShellParser::new(&input).parse(transcript.as_bytes());
        assert_eq!(output.stdout, vec!["hi"]);
    }

    #[test]
    fn test_bare_marker_echo_ends_window() {
        let input = stdin(&["echo hi"]);
        let transcript = format!(
            "echo hi\nhi\n{}\n__exit_code__||0|%errorlevel%|0|\n",
            ECHO_COMMAND
        );
        let output = ShellParser::new(&input).parse(transcript.as_bytes());
        assert_eq!(output.stdout, vec!["hi"]);
    }

    #[test]
    fn test_single_line_pipe_status() {
        let input = stdin(&["false | true"]);
        let transcript = b"$ false | true\n__exit_code__||0|%errorlevel%|1|\n";
        assert_eq!(ShellParser::new(&input).parse(transcript).code, 1);
    }

    #[test]
    fn test_multi_line_ignores_pipe_status() {
        let input = stdin(&["false | true", "echo done"]);
        let transcript = b"$ false | true\n\
            __exit_code__||0|%errorlevel%|1|\n\
            $ echo done\n\
            done\n\
            __exit_code__||0|%errorlevel%|0|\n";
        let output = ShellParser::new(&input).parse(transcript);
        assert_eq!(output.code, 0);
        assert_eq!(output.stdout, vec!["done"]);
    }

    #[test]
    fn test_output_ending_with_command_is_not_an_echo() {
        let input = stdin(&["ls"]);
        let transcript = b"$ ls\ntools\n__exit_code__||0|%errorlevel%|0|\n";
        assert_eq!(ShellParser::new(&input).parse(transcript).stdout, vec!["tools"]);
    }

    #[test]
    fn test_malformed_marker_is_success() {
        let input = stdin(&["foo"]);
        let output = ShellParser::new(&input).parse(b"foo\nbar\n__exit_code__|1|1\n");
        assert_eq!(output.stdout, vec!["bar"]);
        assert_eq!(output.code, 0);
    }

    #[test]
    fn test_decorated_echo_found_by_substring() {
        let input = stdin(&["ls"]);
        let transcript = b"> ls    [12:00]\nfile.txt\n__exit_code__||0|%errorlevel%|0|\n";
        let output = ShellParser::new(&input).parse(transcript);
        assert_eq!(output.stdout, vec!["file.txt"]);
    }

    #[test]
    fn test_cmd_transcript() {
        let input = stdin(&["ver"]);
        let mut transcript = crate::detect::CMD_PREAMBLE.to_vec();
        transcript.extend_from_slice(
            b"\x1b]0;C:\\WINDOWS\\system32\\cmd.exe\x07Microsoft Windows [Version 10.0.19045]\r\n\
              (c) Microsoft Corporation. All rights reserved.\r\n\r\n\
              C:\\Users\\me>ver\r\n\r\n\
              Microsoft Windows [Version 10.0.19045]\r\n\r\n",
        );
        transcript.extend_from_slice(format!("C:\\Users\\me>{}\r\n", ECHO_COMMAND).as_bytes());
        transcript.extend_from_slice(
            b"\"__exit_code__|$LastExitCode|$?|0|$PIPESTATUS|$pipestatus\"\r\n\r\nC:\\Users\\me>exit\r\n",
        );
        let output = ShellParser::new(&input).parse(&transcript);
        assert_eq!(
            output.stdout,
            vec!["", "Microsoft Windows [Version 10.0.19045]", ""]
        );
        assert_eq!(output.code, 0);
    }

    #[test]
    fn test_missing_marker_yields_no_output() {
        let input = stdin(&["sleep 100"]);
        let output = ShellParser::new(&input).parse(b"$ sleep 100\n");
        assert!(output.stdout.is_empty());
        assert_eq!(output.code, 0);
    }
}
