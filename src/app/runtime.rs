//! Runtime initialization and setup

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app::{config::ServerSettings, logging::init_logging};
use crate::cli::Cli;
use crate::server::ArchiveServer;

/// Loads settings and initializes logging for a command line.
pub fn initialize_app(cli: &Cli) -> Result<ServerSettings> {
    let settings = ServerSettings::load(cli)?;
    init_logging(&settings, cli.verbose)?;
    Ok(settings)
}

/// Runs the server until Ctrl-C.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = initialize_app(&cli)?;

    if !settings.storage_path.is_dir() {
        warn!(
            "Storage path {} does not exist yet; every archive will be reported missing",
            settings.storage_path.display()
        );
    }
    info!(
        "Serving archives from {} on http://{}",
        settings.storage_path.display(),
        settings.bind_address()
    );

    ArchiveServer::new(&settings)
        .start()
        .await
        .context("Archive server stopped with an error")
}
