//! External process execution.
//!
//! Commands are argument vectors, never shell strings. The textual form is
//! only used for logging and lifecycle events.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use itertools::Itertools;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A program invocation: program, arguments and an optional file that
/// receives the program's stdout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
    stdout: Option<PathBuf>,
}

impl CommandLine {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdout_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn stdout(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let line = std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy())
            .join(" ");
        match &self.stdout {
            Some(path) => write!(f, "{} > {}", line, path.display()),
            None => write!(f, "{}", line),
        }
    }
}

/// What a finished child process reported back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub code: Option<i32>,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero (or missing) exit code into `Error::CommandFailed`.
    pub fn check(self, command: &CommandLine) -> Result<ProcessOutcome> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::command_failed(
                command.to_string(),
                self.code,
                self.stderr,
            ))
        }
    }
}

/// Runs a [`CommandLine`] to completion.
///
/// `Err` means the process could not be started or waited on; a process
/// that ran and failed is reported through [`ProcessOutcome`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &CommandLine) -> Result<ProcessOutcome>;
}

/// Runs commands as real child processes, blocking until they exit.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &CommandLine) -> Result<ProcessOutcome> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped());
        match &command.stdout {
            Some(path) => cmd.stdout(File::create(path)?),
            None => cmd.stdout(Stdio::piped()),
        };

        tracing::debug!("Spawning {}", command);
        let output = cmd.output()?;
        if !output.stdout.is_empty() {
            tracing::info!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
        }

        Ok(ProcessOutcome {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
