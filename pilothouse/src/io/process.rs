//! Subprocess execution for the container runtime and helper tools.
//!
//! The [`CommandExecutor`] trait decouples orchestration from real process
//! spawning. Tests use scripted executors that return predetermined outputs
//! without touching docker.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How a subprocess's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Pipe stdout/stderr; nothing reaches the console.
    Capture,
    /// Inherit the console so the operator sees output live.
    Stream,
}

/// A single subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Working directory for the child.
    pub directory: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub mode: OutputMode,
    /// Kill the child after this long. `None` blocks until it exits.
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// Render as a shell-like line for logs and error messages.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Outcome of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code; `None` when killed by a signal or on timeout.
    pub code: Option<i32>,
    /// Trimmed stdout in capture mode, empty in stream mode.
    pub stdout: String,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }
}

/// Abstraction over process spawning.
pub trait CommandExecutor {
    /// Run `request` to completion.
    ///
    /// Errors only when the process could not be spawned or waited on; a
    /// non-zero exit is reported through [`CommandResult::code`].
    fn run(&self, request: &CommandRequest) -> Result<CommandResult>;
}

/// Executor that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    #[instrument(skip_all, fields(program = %request.program, mode = ?request.mode))]
    fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.directory);

        match request.mode {
            OutputMode::Capture => run_captured(cmd, request),
            OutputMode::Stream => run_streamed(cmd, request),
        }
    }
}

fn spawn(mut cmd: Command, request: &CommandRequest) -> Result<Child> {
    debug!(command = %request.display_line(), "spawning child process");
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) => {
            error!(err = %e, program = %request.program, "failed to spawn command");
            Err(e).with_context(|| format!("spawn {}", request.program))
        }
    }
}

fn run_captured(mut cmd: Command, request: &CommandRequest) -> Result<CommandResult> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(cmd, request)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    // Drain both pipes while the child runs so a chatty process cannot block.
    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let (status, timed_out) = wait_child(&mut child, request.timeout)?;

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;
    if !stderr.is_empty() {
        debug!(stderr = %String::from_utf8_lossy(&stderr).trim(), "captured stderr");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandResult {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
        timed_out,
    })
}

fn run_streamed(mut cmd: Command, request: &CommandRequest) -> Result<CommandResult> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let mut child = spawn(cmd, request)?;
    let (status, timed_out) = wait_child(&mut child, request.timeout)?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandResult {
        code: status.code(),
        stdout: String::new(),
        timed_out,
    })
}

fn wait_child(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            Ok((child.wait().context("wait command after kill")?, true))
        }
    }
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}
