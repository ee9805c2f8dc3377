//! Combined-output capture for the test process.
//!
//! Stdout and stderr are pumped by two reader tasks into one channel; a single
//! collector task appends every chunk to the log file and to an in-memory
//! buffer (and optionally echoes it). The child's exit status never flows
//! through here, so a capture problem cannot change it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::join_all;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

const CHUNK_SIZE: usize = 8 * 1024;
const CHANNEL_DEPTH: usize = 64;

/// What the collector gathered.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub bytes: Vec<u8>,
    /// Log path, if every chunk was persisted.
    pub log_path: Option<PathBuf>,
    pub capture_error: Option<String>,
}

/// Running capture of one child process.
pub struct OutputTee {
    readers: Vec<JoinHandle<()>>,
    collector: JoinHandle<CapturedOutput>,
}

impl OutputTee {
    /// Starts pumping `stdout` and `stderr` into `log_path`.
    pub fn spawn<O, E>(stdout: O, stderr: E, log_path: &Path, echo: bool) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let readers = vec![
            tokio::spawn(pump(stdout, tx.clone())),
            tokio::spawn(pump(stderr, tx)),
        ];
        let collector = tokio::spawn(collect(rx, log_path.to_path_buf(), echo));
        Self { readers, collector }
    }

    /// Waits for both streams to reach EOF, then closes the log.
    ///
    /// Streams still open after `grace` (e.g. held by a grandchild that
    /// outlived the test process) are cut off.
    pub async fn finish(self, grace: Duration) -> CapturedOutput {
        let Self { readers, collector } = self;
        let abort_handles: Vec<AbortHandle> =
            readers.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(grace, join_all(readers)).await.is_err() {
            tracing::warn!(
                grace = %humantime::format_duration(grace),
                "Output streams still open after the test process exited; closing them"
            );
            for handle in &abort_handles {
                handle.abort();
            }
        }
        wait_collector(collector).await
    }

    /// Cuts both streams off immediately and closes the log.
    pub async fn abort(self) -> CapturedOutput {
        let Self { readers, collector } = self;
        for reader in &readers {
            reader.abort();
        }
        join_all(readers).await;
        wait_collector(collector).await
    }
}

// Aborted readers drop their senders, which ends the collector loop.
async fn wait_collector(collector: JoinHandle<CapturedOutput>) -> CapturedOutput {
    match collector.await {
        Ok(captured) => captured,
        Err(e) => CapturedOutput {
            capture_error: Some(format!("output collector failed: {e}")),
            ..CapturedOutput::default()
        },
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reading test output failed");
                break;
            }
        }
    }
}

async fn collect(mut rx: mpsc::Receiver<Vec<u8>>, log_path: PathBuf, echo: bool) -> CapturedOutput {
    let mut captured = CapturedOutput::default();

    let mut log = match open_log(&log_path).await {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(path = %log_path.display(), error = %e, "Cannot open test output log");
            captured.capture_error = Some(format!("cannot open {}: {e}", log_path.display()));
            None
        }
    };
    let mut stdout = echo.then(tokio::io::stdout);

    while let Some(chunk) = rx.recv().await {
        if let Some(file) = log.as_mut()
            && let Err(e) = file.write_all(&chunk).await
        {
            tracing::warn!(path = %log_path.display(), error = %e, "Writing test output log failed");
            captured.capture_error = Some(format!("cannot write {}: {e}", log_path.display()));
            log = None;
        }
        if let Some(out) = stdout.as_mut()
            && out.write_all(&chunk).await.is_err()
        {
            stdout = None;
        }
        captured.bytes.extend_from_slice(&chunk);
    }

    if let Some(out) = stdout.as_mut()
        && let Err(e) = out.flush().await
    {
        tracing::debug!(error = %e, "Flushing echoed test output failed");
    }
    if let Some(mut file) = log {
        match file.flush().await {
            Ok(()) => captured.log_path = Some(log_path),
            Err(e) => {
                captured.capture_error = Some(format!("cannot flush {}: {e}", log_path.display()));
            }
        }
    }

    captured
}

async fn open_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    File::create(path).await
}
