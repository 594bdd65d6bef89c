//! process
//!
//! Async subprocess execution shared by every shell-out (git porcelain
//! commands, the recipe engine, the hosting CLI).
//!
//! # Invariants
//!
//! - Every invocation suspends the calling task instead of blocking the
//!   runtime thread.
//! - Children are killed if the awaiting future is dropped, so a cancelled
//!   attempt does not leave a recipe run behind.
//! - Arguments reach the child byte for byte; only captured output is
//!   converted, as lossy UTF-8.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

/// Errors from running a subprocess.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("{program} exited with {}: {}", describe_code(.code), .stderr.trim())]
    Failed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

/// Captured output of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A subprocess invocation under construction.
///
/// # Example
///
/// ```no_run
/// use autopkg_prs::process::Invocation;
///
/// # tokio_test::block_on(async {
/// let out = Invocation::new("git")
///     .args(["status", "--porcelain"])
///     .current_dir("/ci/repo")
///     .run_checked()
///     .await
///     .unwrap();
/// println!("{}", out.stdout);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl Invocation {
    /// Start describing an invocation of `program`.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run in `dir` instead of the current directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The program's display name.
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// The arguments collected so far.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Run to completion and capture output, whatever the exit status.
    pub async fn run(&self) -> Result<CommandOutput, ProcessError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        tracing::trace!(program = %self.program_name(), args = ?self.args, "spawning");

        let output = cmd.output().await.map_err(|e| ProcessError::Spawn {
            program: self.program_name(),
            source: e,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run to completion, treating a non-zero exit as an error.
    pub async fn run_checked(&self) -> Result<CommandOutput, ProcessError> {
        let output = self.run().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ProcessError::Failed {
                program: self.program_name(),
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}
