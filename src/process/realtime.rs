//! Progressive draining of a running child's output streams.
//!
//! The blocking [`ProcessHandle::read`] drain suits request/response usage;
//! this loop instead surfaces chunks as they arrive, for callers consuming
//! a long-running child's output progressively.

use tokio::io::AsyncReadExt;

use crate::process::{ChannelKind, ProcessError, ProcessHandle, StreamKind, CHUNK_SIZE};

impl ProcessHandle {
    /// Drain stdout and stderr as data becomes available, invoking
    /// `on_chunk` with the channel kind for every non-empty read.
    ///
    /// Reads are event-driven per stream rather than polled, preserving
    /// the observable contract: chunks arrive in per-stream write order,
    /// interleaving between the two streams is unspecified, and the loop
    /// ends once the child has closed both pipes, even for a child that
    /// never produces output. Consumes both readable streams; a later
    /// `read`/`read_error` on the same handle reports them unavailable.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError` if a stream was already consumed or a read
    /// fails mid-loop.
    pub async fn stream_realtime<F>(&mut self, mut on_chunk: F) -> Result<(), ProcessError>
    where
        F: FnMut(ChannelKind, &str),
    {
        let mut stdout = self
            .stdout
            .take()
            .ok_or(ProcessError::StreamUnavailable(StreamKind::Stdout))?;
        let Some(mut stderr) = self.stderr.take() else {
            self.stdout = Some(stdout);
            return Err(ProcessError::StreamUnavailable(StreamKind::Stderr));
        };

        let mut out_buf = [0u8; CHUNK_SIZE];
        let mut err_buf = [0u8; CHUNK_SIZE];
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                // Error stream first: result frames and crash diagnostics
                // travel on it, and they are what callers wait for.
                biased;

                read = stderr.read(&mut err_buf), if err_open => {
                    match read {
                        Ok(0) => err_open = false,
                        Ok(n) => {
                            on_chunk(ChannelKind::Stderr, &String::from_utf8_lossy(&err_buf[..n]));
                        }
                        Err(source) => {
                            return Err(ProcessError::Io { stream: StreamKind::Stderr, source });
                        }
                    }
                }
                read = stdout.read(&mut out_buf), if out_open => {
                    match read {
                        Ok(0) => out_open = false,
                        Ok(n) => {
                            on_chunk(ChannelKind::Stdout, &String::from_utf8_lossy(&out_buf[..n]));
                        }
                        Err(source) => {
                            return Err(ProcessError::Io { stream: StreamKind::Stdout, source });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
