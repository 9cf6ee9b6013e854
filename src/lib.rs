//! # archivist
//!
//! Streams ZIP archives of stored directories to HTTP clients on demand.
//!
//! ## Usage
//!
//! ```bash
//! archivist [-d] [-H host] [-P port] [-S storage_path] [-C chunk_kib] [-D delay_secs]
//! ```
//!
//! `GET /archive/<identifier>/` zips `<storage_path>/<identifier>` with an
//! external archiver and sends its output while it is being produced.
//!
//! ## Modules
//!
//! - `app` - Settings, logging and runtime setup
//! - `cli` - Command-line arguments
//! - `error` - Download failures and their HTTP mapping
//! - `server` - Routes and the axum server
//! - `storage` - Archive identifiers and storage lookup
//! - `subprocess` - The external archiver process and its test doubles
//! - `transfer` - Pacing archive output into a response body
pub mod app;
pub mod cli;
pub mod error;
pub mod server;
pub mod storage;
pub mod subprocess;
pub mod transfer;

pub use error::{ArchiveError, Result};
