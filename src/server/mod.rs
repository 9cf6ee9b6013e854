//! HTTP server for archive downloads

mod handlers;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::config::ServerSettings;
use crate::storage::{DirectoryResolver, StorageResolver};
use crate::subprocess::{ArchiveLauncher, TokioArchiveLauncher};
use crate::transfer::TransferSettings;

/// Shared handler state
#[derive(Clone)]
pub struct ServerState {
    pub resolver: Arc<dyn StorageResolver>,
    pub launcher: Arc<dyn ArchiveLauncher>,
    pub transfer: TransferSettings,
    /// Set in debug mode; serves `index.html` from this directory at `/`.
    pub templates_dir: Option<PathBuf>,
}

/// Archive download server
pub struct ArchiveServer {
    state: ServerState,
    bind_address: String,
}

impl ArchiveServer {
    /// Create a server backed by the storage directory and archiver in `settings`.
    pub fn new(settings: &ServerSettings) -> Self {
        let server = Self::with_parts(
            Arc::new(DirectoryResolver::new(&settings.storage_path)),
            Arc::new(TokioArchiveLauncher::new(settings.archive_command())),
            settings.transfer(),
        )
        .with_bind_address(settings.bind_address());

        if settings.debug {
            server.with_debug_index(settings.templates_dir.clone())
        } else {
            server
        }
    }

    /// Create a server from explicit collaborators.
    pub fn with_parts(
        resolver: Arc<dyn StorageResolver>,
        launcher: Arc<dyn ArchiveLauncher>,
        transfer: TransferSettings,
    ) -> Self {
        Self {
            state: ServerState {
                resolver,
                launcher,
                transfer,
                templates_dir: None,
            },
            bind_address: "localhost:8080".to_string(),
        }
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Serve the index page from `templates_dir` at `/`.
    pub fn with_debug_index(mut self, templates_dir: PathBuf) -> Self {
        self.state.templates_dir = Some(templates_dir);
        self
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route(
                "/archive/{identifier}/",
                get(handlers::start_archive_download),
            )
            .route(
                "/archive/{identifier}",
                get(handlers::start_archive_download),
            )
            .route("/archive/", get(handlers::missing_identifier))
            .route("/archive", get(handlers::missing_identifier));

        if self.state.templates_dir.is_some() {
            router = router.route("/", get(handlers::index_page));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.state.clone()))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind_address))?;
        self.serve_with_listener(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        info!("Starting archive server on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Archive server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler the server only stops with the process.
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
