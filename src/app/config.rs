//! Server configuration
//!
//! Settings come from built-in defaults, optionally overlaid by a TOML file,
//! then by command-line flags that were given explicitly.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::subprocess::{ArchiveCommand, ArchiveCommandBuilder};
use crate::transfer::{TransferSettings, DEFAULT_CHUNK_SIZE, DEFAULT_DELAY};

/// External archiver invocation; the archive name is appended as last argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiverSettings {
    #[serde(default = "default_archiver_program")]
    pub program: String,
    #[serde(default = "default_archiver_args")]
    pub args: Vec<String>,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            program: default_archiver_program(),
            args: default_archiver_args(),
        }
    }
}

fn default_archiver_program() -> String {
    "zip".to_string()
}

fn default_archiver_args() -> Vec<String> {
    vec!["-r".to_string(), "-".to_string()]
}

/// Everything the server needs at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Directory holding one subdirectory per archive.
    pub storage_path: PathBuf,
    pub log_file: PathBuf,
    /// Bytes per read from the archiver and per write to the client.
    ///
    /// Written in kilobytes in config files, like `--chunk-size`.
    #[serde(with = "kibibytes")]
    pub chunk_size: usize,
    /// Pause between reads.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Grace period between SIGTERM and SIGKILL when stopping an archiver.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Serve the index page and log at debug level.
    pub debug: bool,
    pub templates_dir: PathBuf,
    pub archiver: ArchiverSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            storage_path: PathBuf::from("photos"),
            log_file: PathBuf::from("archive.log"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay: DEFAULT_DELAY,
            stop_timeout: crate::subprocess::runner::DEFAULT_STOP_TIMEOUT,
            debug: false,
            templates_dir: PathBuf::from("templates"),
            archiver: ArchiverSettings::default(),
        }
    }
}

impl ServerSettings {
    /// Reads settings from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Builds the effective settings for a command line.
    pub fn load(cli: &Cli) -> Result<Self> {
        let base = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let settings = base.with_cli_overrides(cli);
        settings.validate()?;
        Ok(settings)
    }

    /// Applies the flags that were passed explicitly.
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if cli.debug {
            self.debug = true;
        }
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(storage_path) = &cli.storage_path {
            self.storage_path = storage_path.clone();
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = log_file.clone();
        }
        if let Some(kib) = cli.chunk_size {
            self.chunk_size = kib.saturating_mul(1024);
        }
        if let Some(delay) = cli.delay {
            self.delay = delay;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk size must be greater than zero"));
        }
        if self.storage_path.as_os_str().is_empty() {
            return Err(anyhow!("storage path must not be empty"));
        }
        if self.archiver.program.trim().is_empty() {
            return Err(anyhow!("archiver program must not be empty"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn transfer(&self) -> TransferSettings {
        TransferSettings {
            chunk_size: self.chunk_size,
            delay: self.delay,
        }
    }

    pub fn archive_command(&self) -> ArchiveCommand {
        ArchiveCommandBuilder::new(&self.archiver.program)
            .args(&self.archiver.args)
            .stop_timeout(self.stop_timeout)
            .build()
    }
}

/// (De)serializes a byte count as a whole number of KiB.
mod kibibytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &usize, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64((*bytes / 1024) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
        let kib = usize::deserialize(deserializer)?;
        kib.checked_mul(1024)
            .ok_or_else(|| serde::de::Error::custom(format!("chunk size of {kib} KiB is too large")))
    }
}
