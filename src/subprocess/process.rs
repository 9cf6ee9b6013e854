//! Lifecycle of a single archiver subprocess

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::runner::{ArchiveCommand, Chunk, ChunkSource};
use crate::error::{ArchiveError, Result};

/// Bytes of archiver diagnostics kept for error reports.
const STDERR_TAIL_LIMIT: usize = 4096;

/// Upper bound on waiting for the stderr reader after the archiver exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    /// Output drained and the process reaped.
    Finished,
    /// Stopped by [`ArchiveProcess::stop`] and reaped.
    Killed,
}

/// Last few kilobytes of the archiver's stderr.
#[derive(Debug, Default)]
struct StderrTail {
    text: String,
}

impl StderrTail {
    fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        if !line.ends_with('\n') {
            self.text.push('\n');
        }
        if self.text.len() > STDERR_TAIL_LIMIT {
            let mut cut = self.text.len() - STDERR_TAIL_LIMIT;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }
}

/// One archiver invocation bound to one source directory.
///
/// Standard output carries the archive. Diagnostics are logged and the tail
/// is kept for the failure report. The child is always reaped: either by
/// [`read_chunk`](ChunkSource::read_chunk) reaching end of output, or by
/// [`stop`](ChunkSource::stop).
pub struct ArchiveProcess {
    command: ArchiveCommand,
    source_path: Option<PathBuf>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    /// Reused read buffer; each chunk is split off and frozen.
    buffer: BytesMut,
    stderr_tail: Arc<Mutex<StderrTail>>,
    stderr_task: Option<JoinHandle<()>>,
    exit_status: Option<std::process::ExitStatus>,
    state: ProcessState,
}

impl ArchiveProcess {
    pub fn new(command: ArchiveCommand) -> Self {
        Self {
            command,
            source_path: None,
            child: None,
            stdout: None,
            buffer: BytesMut::new(),
            stderr_tail: Arc::new(Mutex::new(StderrTail::default())),
            stderr_task: None,
            exit_status: None,
            state: ProcessState::NotStarted,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// OS process id while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }

    /// Exit status, known once the process has been reaped.
    pub fn exit_status(&self) -> Option<std::process::ExitStatus> {
        self.exit_status
    }

    /// Directory the archiver was started for (`working_dir/archive_name`).
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Launches the archiver in `working_dir` to archive `archive_name`.
    pub fn start(&mut self, working_dir: &Path, archive_name: &str) -> Result<()> {
        if self.state != ProcessState::NotStarted {
            return Err(ArchiveError::Unknown(std::io::Error::other(
                "archiver process already started",
            )));
        }

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg(archive_name)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so teardown also reaches anything the archiver forks.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            "Starting archiver: {} {} (cwd: {:?})",
            self.command.display(),
            archive_name,
            working_dir
        );

        let mut child = cmd.spawn().map_err(|e| {
            warn!(
                "Failed to spawn '{}' in {:?}: {} (kind: {:?})",
                self.command.program,
                working_dir,
                e,
                e.kind()
            );
            ArchiveError::ProcessLaunch {
                program: self.command.program.clone(),
                source: e,
            }
        })?;

        self.stdout = child.stdout.take();
        if let Some(stderr) = child.stderr.take() {
            self.stderr_task = Some(Self::capture_stderr(
                stderr,
                self.command.program.clone(),
                Arc::clone(&self.stderr_tail),
            ));
        }

        trace!("Archiver started with pid {:?}", child.id());
        self.source_path = Some(working_dir.join(archive_name));
        self.child = Some(child);
        self.state = ProcessState::Running;
        Ok(())
    }

    fn capture_stderr(
        stderr: ChildStderr,
        program: String,
        tail: Arc<Mutex<StderrTail>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        debug!("{}: {}", program, text.trim_end());
                        if let Ok(mut tail) = tail.lock() {
                            tail.push_line(&text);
                        }
                    }
                    Err(e) => {
                        debug!("Stopped reading {} stderr: {}", program, e);
                        break;
                    }
                }
            }
        })
    }

    fn stderr_text(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.text.clone())
            .unwrap_or_default()
    }

    async fn finish_stderr(&mut self) {
        if let Some(mut task) = self.stderr_task.take() {
            if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
    }

    /// Reaps the child after its output reached EOF.
    async fn reap_after_drain(&mut self) -> Result<Chunk> {
        let Some(child) = self.child.as_mut() else {
            return Err(ArchiveError::Unknown(std::io::Error::other(
                "archiver process handle missing",
            )));
        };

        let status = child.wait().await?;
        self.finish_stderr().await;
        self.exit_status = Some(status);
        self.child = None;
        self.state = ProcessState::Finished;

        if status.success() {
            debug!("Archiver finished successfully");
        } else {
            warn!("Archiver exited with {}: {}", status, self.stderr_text().trim());
        }
        self.finished_outcome()
    }

    fn finished_outcome(&self) -> Result<Chunk> {
        match self.exit_status {
            Some(status) if status.success() => Ok(Chunk::EndOfStream),
            status => Err(ArchiveError::ProcessFailed {
                code: status.and_then(|s| s.code()),
                stderr: self.stderr_text(),
            }),
        }
    }

    #[cfg(unix)]
    fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
            // ESRCH just means the group is already gone.
            if e != nix::errno::Errno::ESRCH {
                warn!("Failed to send {:?} to archiver group {}: {}", signal, pid, e);
            }
        }
    }

    /// SIGTERM, bounded wait, then SIGKILL and an unconditional wait.
    async fn terminate(child: &mut Child, stop_timeout: Duration) -> Option<std::process::ExitStatus> {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            Self::signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        if let Err(e) = child.start_kill() {
            warn!("Failed to signal archiver: {}", e);
        }

        match tokio::time::timeout(stop_timeout, child.wait()).await {
            Ok(Ok(status)) => return Some(status),
            Ok(Err(e)) => warn!("Failed waiting for archiver to exit: {}", e),
            Err(_) => warn!(
                "Archiver did not exit within {:?} of SIGTERM, killing it",
                stop_timeout
            ),
        }

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            Self::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        }
        if let Err(e) = child.kill().await {
            warn!("Failed to kill archiver: {}", e);
        }
        match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Failed to reap archiver: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ChunkSource for ArchiveProcess {
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Chunk> {
        match self.state {
            ProcessState::Running => {}
            ProcessState::Finished => return self.finished_outcome(),
            ProcessState::NotStarted => {
                return Err(ArchiveError::Unknown(std::io::Error::other(
                    "archiver process not started",
                )))
            }
            ProcessState::Killed => {
                return Err(ArchiveError::Unknown(std::io::Error::other(
                    "archiver process was stopped",
                )))
            }
        }

        // A zero-length read buffer would look exactly like EOF.
        if max_bytes == 0 {
            return Ok(Chunk::Data(Bytes::new()));
        }

        if let Some(stdout) = self.stdout.as_mut() {
            self.buffer.reserve(max_bytes);
            let n = stdout
                .take(max_bytes as u64)
                .read_buf(&mut self.buffer)
                .await?;
            if n > 0 {
                trace!("Read {} bytes from archiver", n);
                return Ok(Chunk::Data(self.buffer.split().freeze()));
            }
            self.stdout = None;
        }

        // Output fully drained; only now is the exit status meaningful.
        self.reap_after_drain().await
    }

    async fn stop(&mut self) {
        if self.state != ProcessState::Running {
            return;
        }

        // Closing our end makes a still-writing archiver hit EPIPE.
        self.stdout = None;

        if let Some(mut child) = self.child.take() {
            let status = match child.try_wait() {
                Ok(Some(status)) => Some(status),
                Ok(None) => Self::terminate(&mut child, self.command.stop_timeout).await,
                Err(e) => {
                    warn!("Failed to query archiver status: {}", e);
                    Self::terminate(&mut child, self.command.stop_timeout).await
                }
            };
            self.exit_status = status;
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        self.state = ProcessState::Killed;
        debug!("Archiver stopped (status: {:?})", self.exit_status);
    }
}
