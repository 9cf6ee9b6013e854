//! Archive transfers
//!
//! A [`StreamingTransfer`] pulls chunks from a [`ChunkSource`] and pushes them
//! into a [`ChunkSink`], pacing reads and tearing the source down on every
//! exit path. [`spawn_transfer`] runs one as its own task behind an HTTP body.

pub mod sink;
pub mod streaming;


pub use sink::{body_channel, ChannelSink, ChunkSink, TransferBody};
pub use streaming::{
    StreamingTransfer, TransferReport, TransferSettings, TransferState, DEFAULT_CHUNK_SIZE,
    DEFAULT_DELAY,
};

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{ArchiveError, Result};
use crate::storage::ArchiveId;
use crate::subprocess::ChunkSource;

/// Runs a transfer on its own task; the task owns `source` until it is stopped.
pub fn spawn_transfer<S>(
    id: ArchiveId,
    settings: TransferSettings,
    sink: S,
    mut source: Box<dyn ChunkSource>,
) -> JoinHandle<Result<TransferReport>>
where
    S: ChunkSink + 'static,
{
    tokio::spawn(async move {
        let mut transfer = StreamingTransfer::new(id, settings, sink);
        transfer.run(source.as_mut()).await
    })
}

/// Waits for a spawned transfer and returns its outcome.
///
/// `Cancelled` comes back as is. A transfer task that panicked or was aborted
/// is reported as `Unknown` instead of disappearing with its handle.
pub async fn join_transfer(
    id: ArchiveId,
    handle: JoinHandle<Result<TransferReport>>,
) -> Result<TransferReport> {
    match handle.await {
        Ok(outcome) => {
            debug!("Transfer of '{}' ended: {:?}", id, outcome);
            outcome
        }
        Err(e) => {
            error!("Transfer task for '{}' did not finish: {}", id, e);
            Err(ArchiveError::Unknown(std::io::Error::other(e.to_string())))
        }
    }
}
