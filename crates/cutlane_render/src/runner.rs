use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::job::Job;
use crate::progress::{ProgressParser, ProgressSnapshot};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};

/// Called once with the output path when a job produced its output.
pub type OutputCallback = Box<dyn FnOnce(PathBuf) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Produced(PathBuf),
    /// The process ran but left no usable output: it crashed, exited
    /// non-zero, or wrote nothing. `status` is the exit code if there was one.
    NotProduced { status: Option<i32> },
}

/// A running job.
#[derive(Debug)]
pub struct JobHandle {
    progress: watch::Receiver<ProgressSnapshot>,
    output: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    /// Receiver for progress snapshots. Updates arrive on the runner's
    /// tasks; observers re-dispatch from here.
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.clone()
    }

    /// Wait for the job to settle, at most `timeout`.
    pub async fn wait_for_output(self, timeout: Duration) -> Result<JobOutcome> {
        match tokio::time::timeout(timeout, self.output).await {
            Ok(Ok(outcome)) => Ok(outcome),
            // supervisor went away without reporting
            Ok(Err(_)) => Ok(JobOutcome::NotProduced { status: None }),
            Err(_) => Err(RenderError::Timeout(timeout)),
        }
    }
}

/// Starts engine processes.
#[derive(Debug, Clone)]
pub struct Runner {
    engine: PathBuf,
}

impl Runner {
    pub fn new(engine: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        Ok(Self::new(config.locate_engine()?))
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// Start `job` as exactly one engine process. Must be called from
    /// within a tokio runtime.
    ///
    /// `on_output` fires once, after exit, only when the output file exists
    /// and is non-empty.
    pub fn execute(&self, job: Job, on_output: Option<OutputCallback>) -> Result<JobHandle> {
        tracing::debug!(command = %job.command_line(&self.engine), "starting engine");

        let mut child = Command::new(&self.engine)
            .args(job.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::EngineNotFound
                } else {
                    RenderError::Io(e)
                }
            })?;

        let output = job.output().to_path_buf();
        tracing::info!(output = %output.display(), "render job started");

        let (parser, progress) = ProgressParser::channel(job.declared_duration());
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx));
        }
        let dispatcher = tokio::spawn(dispatch(parser, line_rx));

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let status = child.wait().await;
            // drains once both readers hit EOF
            let _ = dispatcher.await;
            let outcome = settle(status, output, on_output).await;
            let _ = done_tx.send(outcome);
        });

        Ok(JobHandle {
            progress,
            output: done_rx,
        })
    }
}

/// Forward lines until EOF. Bytes that are not UTF-8 are replaced rather
/// than ending the read, so the engine never writes into a closed pipe.
async fn forward_lines<R: AsyncRead + Unpin>(stream: R, tx: mpsc::UnboundedSender<String>) {
    let mut segments = BufReader::new(stream).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes);
                // a closed dispatcher still leaves the pipe to drain
                let _ = tx.send(line.trim_end_matches('\r').to_string());
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read engine output");
                break;
            }
        }
    }
}

async fn dispatch(mut parser: ProgressParser, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        parser.feed(&line);
    }
}

async fn settle(
    status: std::io::Result<ExitStatus>,
    output: PathBuf,
    on_output: Option<OutputCallback>,
) -> JobOutcome {
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "failed to wait for engine");
            return JobOutcome::NotProduced { status: None };
        }
    };

    let size = tokio::fs::metadata(&output)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    if status.success() && size > 0 {
        tracing::info!(output = %output.display(), bytes = size, "render job finished");
        if let Some(callback) = on_output {
            callback(output.clone());
        }
        JobOutcome::Produced(output)
    } else {
        tracing::warn!(%status, bytes = size, output = %output.display(), "engine produced no output");
        JobOutcome::NotProduced {
            status: status.code(),
        }
    }
}
