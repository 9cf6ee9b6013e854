//! CLI argument structures
//!
//! Every flag is optional so that values from a config file are only
//! overridden when given explicitly; defaults live in `ServerSettings`.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Stream ZIP archives of stored directories over HTTP
#[derive(Parser, Debug)]
#[command(name = "archivist")]
#[command(about = "archivist - Stream ZIP archives of stored directories over HTTP", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Serve the index page for debugging and log at debug level
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Host to bind (default: localhost)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to bind (default: 8080)
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Directory holding one subdirectory per archive (default: ./photos)
    #[arg(short = 'S', long = "storage-path", visible_alias = "storage_path")]
    pub storage_path: Option<PathBuf>,

    /// Log file path (default: ./archive.log)
    #[arg(short = 'L', long = "log-file", visible_alias = "log_file")]
    pub log_file: Option<PathBuf>,

    /// Chunk size in kilobytes sent to a client per write (default: 100)
    #[arg(short = 'C', long = "chunk-size", visible_alias = "chunk_size")]
    pub chunk_size: Option<usize>,

    /// Delay in seconds between chunks sent to a client (default: 0.5)
    #[arg(short = 'D', long, value_parser = parse_delay)]
    pub delay: Option<Duration>,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_delay(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("delay must be a non-negative number, got {raw}"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("delay {raw} is too large"))
}
