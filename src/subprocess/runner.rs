use async_trait::async_trait;
use axum::body::Bytes;
use std::time::Duration;

use super::builder::ArchiveCommandBuilder;
use super::process::ArchiveProcess;
use crate::error::Result;
use crate::storage::ArchiveRequest;

/// How long a stopped archiver gets to exit after SIGTERM before SIGKILL.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// The archiver invocation, minus the directory name appended at start.
#[derive(Debug, Clone)]
pub struct ArchiveCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stop_timeout: Duration,
}

impl ArchiveCommand {
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// One pull from an archive producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Output bytes; may be empty when nothing new is available yet.
    Data(Bytes),
    /// The producer is exhausted and exited successfully.
    EndOfStream,
}

impl Chunk {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Chunk::EndOfStream)
    }

    pub fn len(&self) -> usize {
        match self {
            Chunk::Data(bytes) => bytes.len(),
            Chunk::EndOfStream => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A pull-based producer of archive bytes with guaranteed teardown.
#[async_trait]
pub trait ChunkSource: Send {
    /// Reads up to `max_bytes` of output.
    ///
    /// Returns `Chunk::EndOfStream` only once the output is fully drained and
    /// the producer finished successfully.
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Chunk>;

    /// Terminates the producer if it is still running. Idempotent, never fails.
    async fn stop(&mut self);
}

/// Starts archive producers for resolved requests.
#[async_trait]
pub trait ArchiveLauncher: Send + Sync {
    async fn launch(&self, request: &ArchiveRequest) -> Result<Box<dyn ChunkSource>>;
}

/// Launches the configured archiver as a tokio child process.
#[derive(Debug, Clone)]
pub struct TokioArchiveLauncher {
    command: ArchiveCommand,
}

impl TokioArchiveLauncher {
    pub fn new(command: ArchiveCommand) -> Self {
        Self { command }
    }

    /// `zip -r - <name>`, which writes the archive to standard output.
    pub fn zip() -> Self {
        Self::new(ArchiveCommandBuilder::new("zip").arg("-r").arg("-").build())
    }

    pub fn command(&self) -> &ArchiveCommand {
        &self.command
    }
}

#[async_trait]
impl ArchiveLauncher for TokioArchiveLauncher {
    async fn launch(&self, request: &ArchiveRequest) -> Result<Box<dyn ChunkSource>> {
        let mut process = ArchiveProcess::new(self.command.clone());
        process.start(request.working_dir(), request.archive_name())?;
        Ok(Box::new(process))
    }
}
