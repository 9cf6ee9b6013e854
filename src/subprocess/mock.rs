use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::runner::{ArchiveLauncher, Chunk, ChunkSource};
use crate::error::{ArchiveError, Result};
use crate::storage::ArchiveRequest;

/// One scripted answer of a [`MockChunkSource`].
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Output bytes, split across reads when larger than the chunk size.
    Data(Vec<u8>),
    /// A read that finds no new data.
    Empty,
    /// Output ends and the producer exits with this code.
    Fail(i32),
    /// An unexpected I/O failure.
    Error(String),
    /// A read that never completes.
    Pending,
}

/// Counters shared between a test and the sources a mock launcher hands out.
#[derive(Debug, Default)]
pub struct MockSourceStats {
    reads: AtomicUsize,
    bytes_read: AtomicUsize,
    stop_calls: AtomicUsize,
    stopped: AtomicBool,
}

impl MockSourceStats {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct MockChunkSource {
    steps: VecDeque<MockStep>,
    /// Unread tail of the current `Data` step.
    remainder: Bytes,
    stats: Arc<MockSourceStats>,
}

impl MockChunkSource {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: steps.into(),
            remainder: Bytes::new(),
            stats: Arc::new(MockSourceStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MockSourceStats> {
        Arc::clone(&self.stats)
    }

    async fn answer(step: Option<MockStep>) -> Result<Chunk> {
        match step {
            None => Ok(Chunk::EndOfStream),
            Some(MockStep::Data(bytes)) => Ok(Chunk::Data(Bytes::from(bytes))),
            Some(MockStep::Empty) => Ok(Chunk::Data(Bytes::new())),
            Some(MockStep::Fail(code)) => Err(ArchiveError::ProcessFailed {
                code: Some(code),
                stderr: "mock archiver failure".to_string(),
            }),
            Some(MockStep::Error(message)) => {
                Err(ArchiveError::Unknown(std::io::Error::other(message)))
            }
            Some(MockStep::Pending) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ChunkSource for MockChunkSource {
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Chunk> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        if self.stats.is_stopped() {
            return Err(ArchiveError::Unknown(std::io::Error::other(
                "mock source was stopped",
            )));
        }

        if self.remainder.is_empty() {
            match self.steps.pop_front() {
                Some(MockStep::Data(bytes)) => self.remainder = Bytes::from(bytes),
                other => return Self::answer(other).await,
            }
        }

        let len = self.remainder.len().min(max_bytes);
        let chunk = self.remainder.split_to(len);
        self.stats.bytes_read.fetch_add(len, Ordering::SeqCst);
        Ok(Chunk::Data(chunk))
    }

    async fn stop(&mut self) {
        self.stats.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stats.stopped.store(true, Ordering::SeqCst);
    }
}

/// Launcher that hands out scripted sources and records every launch.
#[derive(Clone)]
pub struct MockArchiveLauncher {
    steps: Vec<MockStep>,
    fail_launch: bool,
    call_history: Arc<Mutex<Vec<ArchiveRequest>>>,
    launched_stats: Arc<Mutex<Vec<Arc<MockSourceStats>>>>,
}

impl MockArchiveLauncher {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps,
            fail_launch: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
            launched_stats: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A launcher whose archiver can never be started.
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn launch_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    pub fn get_call_history(&self) -> Vec<ArchiveRequest> {
        self.call_history.lock().unwrap().clone()
    }

    /// Counters of all sources launched so far, in launch order.
    pub fn launched_stats(&self) -> Vec<Arc<MockSourceStats>> {
        self.launched_stats.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveLauncher for MockArchiveLauncher {
    async fn launch(&self, request: &ArchiveRequest) -> Result<Box<dyn ChunkSource>> {
        self.call_history.lock().unwrap().push(request.clone());

        if self.fail_launch {
            return Err(ArchiveError::ProcessLaunch {
                program: "mock-archiver".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock launch failure"),
            });
        }

        let source = MockChunkSource::new(self.steps.clone());
        self.launched_stats.lock().unwrap().push(source.stats());
        Ok(Box::new(source))
    }
}

impl Default for MockArchiveLauncher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
