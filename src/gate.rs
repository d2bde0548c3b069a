//! Confirm-then-run boundary between a generated command and the host shell.
//!
//! Nothing reaches the shell unless the answer given for that exact command is
//! an explicit `y`. The gate keeps no state, so an answer never carries over to
//! a later command.

use std::io::{self, BufRead, Write};
use std::process::Command;

use anyhow::Result;
use tracing::{info, warn};

use crate::constants::CONFIRM_PROMPT;

/// Captured result of a command that ran to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Something that can run a command string with both streams captured.
///
/// An `Err` means the command could not be started at all.
pub trait Shell {
    fn run(&self, command: &str) -> io::Result<ExecutionResult>;
}

/// The host command interpreter, `sh -c` on Unix and `cmd /C` on Windows
/// unless configured otherwise.
#[derive(Clone, Debug)]
pub struct HostShell {
    program: String,
    flag: String,
}

impl HostShell {
    pub fn new(program: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            flag: flag.into(),
        }
    }
}

impl Default for HostShell {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl Shell for HostShell {
    fn run(&self, command: &str) -> io::Result<ExecutionResult> {
        let output = Command::new(&self.program)
            .arg(&self.flag)
            .arg(command)
            .output()?;
        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Execute,
    Decline,
}

impl Decision {
    /// Only `y` or `Y` executes. The line terminator is dropped but no other
    /// whitespace is, so `"Y "` declines.
    pub fn parse(answer: &str) -> Self {
        let answer = answer.trim_end_matches(&['\n', '\r'][..]);
        if answer.eq_ignore_ascii_case("y") {
            Decision::Execute
        } else {
            Decision::Decline
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Executed(Option<i32>),
    StartFailed,
    Declined,
}

pub struct ExecutionGate<S = HostShell> {
    shell: S,
}

impl<S> ExecutionGate<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }
}

impl<S: Shell> ExecutionGate<S> {
    /// Shows the candidate command.
    pub fn present<W: Write>(&self, command: &str, out: &mut W) -> io::Result<()> {
        writeln!(out, "\nGenerated command: {command}")?;
        out.flush()
    }

    /// Acts on the user's answer for `command`. Declining touches nothing.
    ///
    /// Standard output goes to `out`; standard error and start failures go to
    /// `err`. A command that fails to start is reported, not returned as an
    /// error.
    pub fn resolve<W: Write, E: Write>(
        &self,
        command: &str,
        answer: &str,
        out: &mut W,
        err: &mut E,
    ) -> Result<TurnOutcome> {
        if Decision::parse(answer) == Decision::Decline {
            info!("declined: {command}");
            return Ok(TurnOutcome::Declined);
        }

        info!("executing: {command}");
        match self.shell.run(command) {
            Ok(result) => {
                writeln!(out, "{}", result.stdout)?;
                out.flush()?;
                if !result.stderr.is_empty() {
                    writeln!(err, "Error: {}", result.stderr)?;
                    err.flush()?;
                }
                match result.exit_code {
                    Some(0) => {}
                    Some(code) => warn!("command exited with status {code}"),
                    None => warn!("command was terminated by a signal"),
                }
                Ok(TurnOutcome::Executed(result.exit_code))
            }
            Err(e) => {
                writeln!(err, "Error executing command: {e}")?;
                err.flush()?;
                Ok(TurnOutcome::StartFailed)
            }
        }
    }

    /// Presents `command`, reads one answer line from `input` and resolves it.
    /// End of input counts as declining.
    pub fn confirm_with_io<R: BufRead, W: Write, E: Write>(
        &self,
        command: &str,
        input: &mut R,
        out: &mut W,
        err: &mut E,
    ) -> Result<TurnOutcome> {
        self.present(command, out)?;
        write!(out, "{CONFIRM_PROMPT}")?;
        out.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        self.resolve(command, &answer, out, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;

    #[derive(Default)]
    struct RecordingShell {
        calls: RefCell<Vec<String>>,
        result: ExecutionResult,
        fail_to_start: bool,
    }

    impl Shell for RecordingShell {
        fn run(&self, command: &str) -> io::Result<ExecutionResult> {
            self.calls.borrow_mut().push(command.to_string());
            if self.fail_to_start {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no shell"));
            }
            Ok(self.result.clone())
        }
    }

    fn text(buf: &[u8]) -> String {
        String::from_utf8_lossy(buf).into_owned()
    }

    #[test]
    fn only_y_is_affirmative() {
        assert_eq!(Decision::parse("y"), Decision::Execute);
        assert_eq!(Decision::parse("Y\n"), Decision::Execute);
        assert_eq!(Decision::parse("y\r\n"), Decision::Execute);
        for answer in ["n", "", "\n", "Y ", " y", "yes", "exit"] {
            assert_eq!(Decision::parse(answer), Decision::Decline, "{answer:?}");
        }
    }

    #[test]
    fn declining_never_invokes_the_shell() {
        let gate = ExecutionGate::new(RecordingShell::default());
        let (mut out, mut err) = (Vec::new(), Vec::new());
        for answer in ["n", "", "Y ", "nope"] {
            let outcome = gate.resolve("rm -rf /tmp/x", answer, &mut out, &mut err).unwrap();
            assert_eq!(outcome, TurnOutcome::Declined);
        }
        assert!(gate.shell.calls.borrow().is_empty());
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[test]
    fn stdout_and_stderr_go_to_separate_channels() {
        let gate = ExecutionGate::new(RecordingShell {
            result: ExecutionResult {
                stdout: "hello".into(),
                stderr: "warning: odd".into(),
                exit_code: Some(0),
            },
            ..Default::default()
        });
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = gate.resolve("greet", "y", &mut out, &mut err).unwrap();

        assert_eq!(outcome, TurnOutcome::Executed(Some(0)));
        assert_eq!(gate.shell.calls.borrow().as_slice(), ["greet"]);
        assert!(text(&out).contains("hello"));
        assert!(!text(&out).contains("warning: odd"));
        assert!(text(&err).contains("Error: warning: odd"));
    }

    #[test]
    fn empty_stderr_prints_nothing_on_error_channel() {
        let gate = ExecutionGate::new(RecordingShell {
            result: ExecutionResult {
                stdout: "ok".into(),
                ..Default::default()
            },
            ..Default::default()
        });
        let (mut out, mut err) = (Vec::new(), Vec::new());
        gate.resolve("true", "Y", &mut out, &mut err).unwrap();
        assert!(err.is_empty());
    }

    #[test]
    fn start_failure_is_reported_not_raised() {
        let gate = ExecutionGate::new(RecordingShell {
            fail_to_start: true,
            ..Default::default()
        });
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = gate.resolve("ls", "y", &mut out, &mut err).unwrap();
        assert_eq!(outcome, TurnOutcome::StartFailed);
        assert!(text(&err).contains("Error executing command: no shell"));
    }

    #[test]
    fn confirm_reads_answer_and_shows_command() {
        let gate = ExecutionGate::new(RecordingShell::default());
        let mut input = Cursor::new(b"n\n".to_vec());
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = gate
            .confirm_with_io("df -h", &mut input, &mut out, &mut err)
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Declined);
        let shown = text(&out);
        assert!(shown.contains("Generated command: df -h"));
        assert!(shown.contains("Execute this command? (y/n): "));
    }

    #[test]
    fn confirm_at_end_of_input_declines() {
        let gate = ExecutionGate::new(RecordingShell::default());
        let mut input = Cursor::new(Vec::new());
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let outcome = gate
            .confirm_with_io("df -h", &mut input, &mut out, &mut err)
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Declined);
        assert!(gate.shell.calls.borrow().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn host_shell_captures_both_streams() {
        let result = HostShell::default()
            .run("echo hello; echo oops >&2; exit 3")
            .unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    fn missing_shell_program_is_a_start_error() {
        let shell = HostShell::new("definitely-not-a-shell-binary", "-c");
        assert!(shell.run("true").is_err());
    }
}
