//! Process execution on tokio

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tasklane_core::error::ExecError;
use tasklane_core::{ProcessExecutor, ProcessOutput, ProcessRequest, Result, TasklaneError};

use crate::reporter::{TaskEvent, TaskReporter};

/// Spawns processes with `tokio::process`, streaming their output lines to a
/// reporter while capturing both streams
pub struct TokioProcessExecutor {
    reporter: Arc<dyn TaskReporter>,
}

impl TokioProcessExecutor {
    pub fn new(reporter: Arc<dyn TaskReporter>) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn execute(
        &self,
        request: ProcessRequest,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or(ExecError::EmptyCommand)?;
        let command_line = request.command.join(" ");

        if cancel.is_cancelled() {
            return Err(TasklaneError::Cancelled);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&request.env)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.chdir {
            command.current_dir(dir);
        }

        debug!(command = %command_line, chdir = ?request.chdir, "spawning process");
        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        if let (Some(data), Some(mut stdin)) = (request.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&data).await {
                    debug!(error = %e, "failed to write process stdin");
                }
            });
        }

        let stdout = child.stdout.take().map(|out| {
            stream_lines(out, false, &request.label, request.color, self.reporter.clone())
        });
        let stderr = child.stderr.take().map(|err| {
            stream_lines(err, true, &request.label, request.color, self.reporter.clone())
        });

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let status = match status {
            Some(status) => status?,
            None => {
                warn!(command = %command_line, "cancelled, killing process");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "failed to kill process");
                }
                return Err(TasklaneError::Cancelled);
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;

        debug!(command = %command_line, exit_code = ?status.code(), "process finished");
        Ok(ProcessOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Forward each line of `reader` to the reporter and return everything read
fn stream_lines<R>(
    reader: R,
    is_stderr: bool,
    label: &str,
    color: Option<u8>,
    reporter: Arc<dyn TaskReporter>,
) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let label = label.to_string();
    tokio::spawn(async move {
        let mut captured = Vec::new();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let text = String::from_utf8_lossy(&buf);
            reporter.report(&TaskEvent::Output {
                label: label.clone(),
                line: text.trim_end_matches(['\n', '\r']).to_string(),
                is_stderr,
                color,
            });
            captured.extend_from_slice(&buf);
        }
        captured
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}
