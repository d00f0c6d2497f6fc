//! Process handle: exclusive ownership of one spawned child and its
//! three standard streams.
//!
//! A handle is created `Running` by [`ProcessHandle::spawn`] and destroyed
//! by [`ProcessHandle::close`], which consumes it. Close must therefore be
//! called exactly once, and the type system enforces it.

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Read granularity for stream drains.
pub(crate) const CHUNK_SIZE: usize = 4096;

/// Error type for process spawning.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The command vector had no executable.
    #[error("empty command: no executable given")]
    EmptyCommand,
    /// The executable was not found.
    #[error("executable not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("permission denied spawning: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    fn from_io(err: std::io::Error, program: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Error type for stream operations on a running child.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The stream was already consumed or never piped.
    #[error("child {0} stream is not available")]
    StreamUnavailable(StreamKind),
    /// I/O failure on one of the child's streams.
    #[error("I/O error on child {stream} stream: {source}")]
    Io {
        /// Which stream failed.
        stream: StreamKind,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// The operating system could not report process status.
///
/// A missing status is a programming or environment error, never a normal
/// state, so it is surfaced rather than folded into "not running".
#[derive(thiserror::Error, Debug)]
#[error("failed to query process status: {0}")]
pub struct StatusError(#[from] std::io::Error);

/// Error type for closing a handle.
#[derive(thiserror::Error, Debug)]
pub enum CloseError {
    /// Closing one of the standard streams failed.
    #[error("failed to close child {stream} stream: {source}")]
    Stream {
        /// Which stream failed to close.
        stream: StreamKind,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reaping the child's exit code failed.
    #[error("failed to reap child process: {0}")]
    Wait(#[from] std::io::Error),
}

/// One of the child's three standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// The child's input stream.
    Stdin,
    /// The child's output stream.
    Stdout,
    /// The child's error stream.
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Which readable channel a realtime chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// The child's output stream.
    Stdout,
    /// The child's error stream.
    Stderr,
}

/// Snapshot of a child's liveness as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    /// Whether the process is still running.
    pub running: bool,
    /// Process ID, while running.
    pub pid: Option<u32>,
    /// Exit code, once exited.
    pub exit_code: Option<i32>,
}

/// A spawned child process and its piped standard streams.
///
/// Exclusively owned by the caller that spawned it; not meant to be shared
/// across concurrent callers.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ChildStderr>,
    exit_code: Option<i32>,
}

impl ProcessHandle {
    /// Spawn a child from an argument vector; the first element is the
    /// executable. `env: None` inherits the parent environment, while
    /// `env: Some(map)` replaces it entirely.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the command is empty or the OS cannot
    /// create the process.
    pub fn spawn(
        command: &[String],
        working_dir: Option<&Path>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<Self, SpawnError> {
        let (program, args) = command.split_first().ok_or(SpawnError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        if let Some(vars) = env {
            cmd.env_clear().envs(vars);
        }

        let mut child = cmd.spawn().map_err(|e| SpawnError::from_io(e, program))?;
        tracing::debug!(pid = ?child.id(), program = %program, "spawned child process");

        Ok(Self {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            exit_code: None,
        })
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write bytes to the child's input stream.
    ///
    /// Blocks until the underlying pipe accepts the write; returns the
    /// number of bytes written, with no partial-write retry beyond the
    /// stream's own contract.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` if stdin is gone or the write fails.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<usize, ProcessError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(ProcessError::StreamUnavailable(StreamKind::Stdin))?;

        let written = stdin.write(bytes).await.map_err(|source| ProcessError::Io {
            stream: StreamKind::Stdin,
            source,
        })?;
        stdin.flush().await.map_err(|source| ProcessError::Io {
            stream: StreamKind::Stdin,
            source,
        })?;
        Ok(written)
    }

    /// Close the child's input stream early, signalling end-of-input.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` if the shutdown fails.
    pub async fn close_stdin(&mut self) -> Result<(), ProcessError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.map_err(|source| ProcessError::Io {
                stream: StreamKind::Stdin,
                source,
            })?;
        }
        Ok(())
    }

    /// Drain the child's output stream to end-of-stream, or to `max_len`
    /// bytes if given. Blocks until the child closes the pipe or the cap
    /// is hit, so call it only once no more writes are needed.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` if stdout is gone or a read fails.
    pub async fn read(&mut self, max_len: Option<usize>) -> Result<String, ProcessError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or(ProcessError::StreamUnavailable(StreamKind::Stdout))?;
        drain(stdout, StreamKind::Stdout, max_len).await
    }

    /// Drain the child's error stream, same contract as [`Self::read`].
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` if stderr is gone or a read fails.
    pub async fn read_error(&mut self, max_len: Option<usize>) -> Result<String, ProcessError> {
        let stderr = self
            .stderr
            .as_mut()
            .ok_or(ProcessError::StreamUnavailable(StreamKind::Stderr))?;
        drain(stderr, StreamKind::Stderr, max_len).await
    }

    /// Query the OS for the child's liveness, pid and exit code.
    ///
    /// Once the child has exited the code is cached, so `status()` keeps
    /// reporting it even after the OS has reaped the process.
    ///
    /// # Errors
    ///
    /// Returns `StatusError` if the OS cannot report status.
    pub fn status(&mut self) -> Result<ProcessStatus, StatusError> {
        if let Some(code) = self.exit_code {
            return Ok(ProcessStatus {
                running: false,
                pid: None,
                exit_code: Some(code),
            });
        }

        match self.child.try_wait().map_err(StatusError)? {
            Some(status) => {
                let code = exit_code_of(status);
                self.exit_code = Some(code);
                Ok(ProcessStatus {
                    running: false,
                    pid: None,
                    exit_code: Some(code),
                })
            }
            None => Ok(ProcessStatus {
                running: true,
                pid: self.child.id(),
                exit_code: None,
            }),
        }
    }

    /// Forcefully kill the child.
    ///
    /// This core provides no deadline of its own; a caller enforcing one
    /// kills the child and must still call [`Self::close`] to reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Close stdin, stdout and stderr in that order, then reap and return
    /// the child's exit code. A signal death maps to `128 + signo` on
    /// Unix.
    ///
    /// # Errors
    ///
    /// Returns `CloseError` naming the stream whose close failed, or a
    /// wait failure while reaping.
    pub async fn close(mut self) -> Result<i32, CloseError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|source| CloseError::Stream {
                    stream: StreamKind::Stdin,
                    source,
                })?;
        }
        drop(self.stdout.take());
        drop(self.stderr.take());

        let status = self.child.wait().await?;
        let code = exit_code_of(status);
        tracing::debug!(code, "child process closed");
        Ok(code)
    }
}

async fn drain<R>(
    reader: &mut R,
    stream: StreamKind,
    max_len: Option<usize>,
) -> Result<String, ProcessError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        if max_len.is_some_and(|cap| buf.len() >= cap) {
            break;
        }
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|source| ProcessError::Io { stream, source })?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    if let Some(cap) = max_len {
        buf.truncate(cap);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn exit_code_of(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}
