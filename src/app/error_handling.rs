//! Error handling utilities

use tracing::error;

/// Exit code for failures before or while serving.
pub const GENERAL_ERROR: i32 = 1;

/// Report a fatal error and exit.
///
/// With `verbose >= 1` the full error chain is printed as well.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(GENERAL_ERROR)
}
