//! Archiver subprocess management
//!
//! An [`ArchiveProcess`] owns one external archiving invocation and exposes its
//! standard output as a pull-based sequence of [`Chunk`]s. Launchers sit behind
//! the [`ArchiveLauncher`] trait so transfers can run against a mock in tests.

pub mod builder;
pub mod mock;
pub mod process;
pub mod runner;


pub use builder::ArchiveCommandBuilder;
pub use mock::{MockArchiveLauncher, MockChunkSource, MockSourceStats, MockStep};
pub use process::{ArchiveProcess, ProcessState};
pub use runner::{ArchiveCommand, ArchiveLauncher, Chunk, ChunkSource, TokioArchiveLauncher};
