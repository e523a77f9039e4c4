//! Transcripts captured from real shells, replayed through the parser

use stm_shell::{detect_platform, Platform, Script, ECHO_COMMAND};

#[test]
fn test_bash_login_transcript() {
    let script = Script::new("cat /etc/hostname\nfalse | true").unwrap();
    let transcript = format!(
        "Last login: Tue Oct 14 09:12:01 2025 from 10.0.0.2\r\n\
         \x1b]0;me@nas: ~\x07\x1b[01;32mme@nas\x1b[00m:\x1b[01;34m~\x1b[00m$ cat /etc/hostname\r\n\
         nas\r\n\
         \x1b[01;32mme@nas\x1b[00m:\x1b[01;34m~\x1b[00m$ {echo}\r\n\
         __exit_code__||0|%errorlevel%|0|\r\n\
         \x1b[01;32mme@nas\x1b[00m:\x1b[01;34m~\x1b[00m$ false | true\r\n\
         \x1b[01;32mme@nas\x1b[00m:\x1b[01;34m~\x1b[00m$ {echo}\r\n\
         __exit_code__||0|%errorlevel%|1|\r\n\
         \x1b[01;32mme@nas\x1b[00m:\x1b[01;34m~\x1b[00m$ exit\r\n\
         logout\r\n",
        echo = ECHO_COMMAND
    );

    assert_eq!(detect_platform(transcript.as_bytes()), Some(Platform::Other));

    let output = script.parse_output(transcript.as_bytes());
    assert_eq!(output.stdout, vec!["nas"]);
    // Two lines were submitted, so the failing pipeline stage is not counted
    assert_eq!(output.code, 0);
}

#[test]
fn test_powershell_transcript() {
    let script = Script::new("Get-Item missing").unwrap();
    let transcript = format!(
        "Windows PowerShell\r\n\
         PS C:\\Users\\me> Get-Item missing\r\n\
         Get-Item : Cannot find path 'C:\\Users\\me\\missing' because it does not exist.\r\n\
         PS C:\\Users\\me> {echo}\r\n\
         __exit_code__||False|%errorlevel%||\r\n\
         PS C:\\Users\\me> exit\r\n",
        echo = ECHO_COMMAND
    );

    let output = script.parse_output(transcript.as_bytes());
    assert_eq!(
        output.stdout,
        vec!["Get-Item : Cannot find path 'C:\\Users\\me\\missing' because it does not exist."]
    );
    assert_eq!(output.code, 1);
}

#[test]
fn test_zsh_pipe_status() {
    let script = Script::new("grep root /etc/passwd | head -n1").unwrap();
    let transcript = format!(
        "me@mac ~ % grep root /etc/passwd | head -n1\n\
         root:*:0:0:System Administrator:/var/root:/bin/sh\n\
         me@mac ~ % {echo}\n\
         __exit_code__||0|%errorlevel%||0 0\n",
        echo = ECHO_COMMAND
    );

    let output = script.parse_output(transcript.as_bytes());
    assert_eq!(output.stdout, vec!["root:*:0:0:System Administrator:/var/root:/bin/sh"]);
    assert_eq!(output.code, 0);
}

#[test]
fn test_dash_transcript() {
    let script = Script::new("ls /nonexistent\nfalse").unwrap();
    let transcript = format!(
        "$ ls /nonexistent\n\
         ls: cannot access '/nonexistent': No such file or directory\n\
         $ {echo}\n\
         __exit_code__||2|%errorlevel%||\n\
         $ false\n\
         $ {echo}\n\
         __exit_code__||1|%errorlevel%||\n\
         $ exit\n",
        echo = ECHO_COMMAND
    );

    let output = script.parse_output(transcript.as_bytes());
    assert_eq!(
        output.stdout,
        vec!["ls: cannot access '/nonexistent': No such file or directory"]
    );
    assert_eq!(output.code, 2);
}

#[test]
fn test_dash_single_failure() {
    let script = Script::new("false").unwrap();
    let transcript = format!(
        "$ false\n$ {echo}\n__exit_code__||1|%errorlevel%||\n$ exit\n",
        echo = ECHO_COMMAND
    );

    let output = script.parse_output(transcript.as_bytes());
    assert!(output.stdout.is_empty());
    assert_eq!(output.code, 1);
}
