//! Common test utilities and helpers
#![allow(dead_code)]

use anyhow::Result;
use archivist::server::ArchiveServer;
use archivist::storage::DirectoryResolver;
use archivist::subprocess::ArchiveLauncher;
use archivist::transfer::TransferSettings;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Builds a storage directory with one subdirectory per archive
pub struct StorageBuilder {
    temp_dir: TempDir,
    files: Vec<(PathBuf, String)>,
    dirs: Vec<PathBuf>,
}

impl StorageBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            files: Vec::new(),
            dirs: Vec::new(),
        })
    }

    /// Add an empty archive directory
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a file, creating its parent directories
    pub fn with_file(mut self, path: impl AsRef<Path>, content: &str) -> Self {
        self.files
            .push((path.as_ref().to_path_buf(), content.to_string()));
        self
    }

    pub fn build(self) -> Result<TempDir> {
        let root = self.temp_dir.path();
        for dir in &self.dirs {
            fs::create_dir_all(root.join(dir))?;
        }
        for (path, content) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(full_path, content)?;
        }
        Ok(self.temp_dir)
    }
}

/// A server running on an ephemeral port until dropped
pub struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    pub async fn spawn(server: ArchiveServer) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            server
                .serve_with_listener(listener, async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Self {
            base_url,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Serve `storage` through `launcher` without pacing delays.
    pub async fn for_storage(storage: &Path, launcher: Arc<dyn ArchiveLauncher>) -> Result<Self> {
        Self::spawn(ArchiveServer::with_parts(
            Arc::new(DirectoryResolver::new(storage)),
            launcher,
            fast_transfer(),
        ))
        .await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub fn fast_transfer() -> TransferSettings {
    TransferSettings {
        chunk_size: 4096,
        delay: Duration::ZERO,
    }
}

/// Whether the `zip` binary can be run on this machine
pub fn zip_available() -> bool {
    std::process::Command::new("zip")
        .arg("-v")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
