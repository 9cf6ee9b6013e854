//! One archive download, from first read to final teardown

use std::time::Duration;
use tracing::{debug, error, info, trace};

use super::sink::ChunkSink;
use crate::error::{ArchiveError, Result};
use crate::storage::ArchiveId;
use crate::subprocess::{Chunk, ChunkSource};

/// Default bytes per read/write: 100 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

/// Default pause between reads.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Streaming,
    /// Every byte was delivered and the archiver exited successfully.
    Completed,
    Aborted,
}

/// Pacing of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub delay: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay: DEFAULT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub state: TransferState,
    pub bytes_written: u64,
    pub chunks_written: u64,
}

/// Pumps one archive producer into one client sink.
pub struct StreamingTransfer<S: ChunkSink> {
    id: ArchiveId,
    settings: TransferSettings,
    sink: S,
    state: TransferState,
    bytes_written: u64,
    chunks_written: u64,
}

impl<S: ChunkSink> StreamingTransfer<S> {
    pub fn new(id: ArchiveId, settings: TransferSettings, sink: S) -> Self {
        Self {
            id,
            settings,
            sink,
            state: TransferState::Streaming,
            bytes_written: 0,
            chunks_written: 0,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn report(&self) -> TransferReport {
        TransferReport {
            state: self.state,
            bytes_written: self.bytes_written,
            chunks_written: self.chunks_written,
        }
    }

    /// Streams `source` to the sink until the end of the archive.
    ///
    /// `source.stop()` runs on every exit path before this returns. A client
    /// disconnect comes back as `ArchiveError::Cancelled`, untouched; any
    /// other failure is logged and the body is ended abruptly.
    pub async fn run(&mut self, source: &mut dyn ChunkSource) -> Result<TransferReport> {
        self.state = TransferState::Streaming;
        debug!("Streaming archive '{}'", self.id);

        let outcome = self.pump(source).await;

        source.stop().await;

        match outcome {
            Ok(()) => {
                self.state = TransferState::Completed;
                info!(
                    "Archive '{}' delivered: {} bytes in {} chunks",
                    self.id, self.bytes_written, self.chunks_written
                );
                Ok(self.report())
            }
            Err(ArchiveError::Cancelled) => {
                self.state = TransferState::Aborted;
                info!(
                    "Download of '{}' was interrupted by the client after {} bytes",
                    self.id, self.bytes_written
                );
                self.sink.abort("client disconnected").await;
                Err(ArchiveError::Cancelled)
            }
            Err(err) => {
                self.state = TransferState::Aborted;
                error!(
                    "Archive transfer of '{}' failed after {} bytes: {}",
                    self.id, self.bytes_written, err
                );
                self.sink.abort(&err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn pump(&mut self, source: &mut dyn ChunkSource) -> Result<()> {
        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.sink.closed() => return Err(ArchiveError::Cancelled),
                chunk = source.read_chunk(self.settings.chunk_size) => chunk?,
            };

            match chunk {
                Chunk::EndOfStream => {
                    self.sink.finish().await?;
                    return Ok(());
                }
                Chunk::Data(bytes) if bytes.is_empty() => {
                    trace!("No new archive data for '{}'", self.id);
                }
                Chunk::Data(bytes) => {
                    let len = bytes.len() as u64;
                    self.sink.write_chunk(bytes).await?;
                    self.bytes_written += len;
                    self.chunks_written += 1;
                    trace!("Sent {} bytes of '{}'", len, self.id);
                }
            }

            if !self.settings.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.sink.closed() => return Err(ArchiveError::Cancelled),
                    _ = tokio::time::sleep(self.settings.delay) => {}
                }
            }
        }
    }
}
