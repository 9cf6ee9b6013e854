use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::identifier::{ArchiveId, ArchiveRequest};
use crate::error::{ArchiveError, Result};

/// Looks up the directory an archive identifier refers to.
#[async_trait]
pub trait StorageResolver: Send + Sync {
    /// Returns the directory for `id`, or `None` when it does not exist.
    async fn resolve(&self, id: &ArchiveId) -> Option<PathBuf>;
}

/// Resolves identifiers to direct subdirectories of a storage root.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageResolver for DirectoryResolver {
    async fn resolve(&self, id: &ArchiveId) -> Option<PathBuf> {
        let candidate = self.root.join(id.as_str());

        match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                debug!("Archive path {:?} is not a directory", candidate);
                return None;
            }
            Err(e) => {
                debug!("Archive path {:?} is not accessible: {}", candidate, e);
                return None;
            }
        }

        // A symlinked entry must not lead outside the storage root.
        let root = tokio::fs::canonicalize(&self.root).await.ok()?;
        let resolved = tokio::fs::canonicalize(&candidate).await.ok()?;
        if !resolved.starts_with(&root) {
            warn!(
                "Archive '{}' resolves outside the storage root: {:?}",
                id, resolved
            );
            return None;
        }

        Some(candidate)
    }
}

/// Validates a raw identifier from the request path and resolves it.
///
/// Fails with `NotFound` for an absent, empty, malformed or unknown
/// identifier. Nothing is launched on any of these paths.
pub async fn resolve_request(
    resolver: &dyn StorageResolver,
    raw: Option<&str>,
) -> Result<ArchiveRequest> {
    let raw = raw.unwrap_or_default();
    let id = ArchiveId::parse(raw)?;

    match resolver.resolve(&id).await {
        Some(source_path) => Ok(ArchiveRequest::new(id, source_path)),
        None => Err(ArchiveError::not_found(format!("no archive named '{id}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_with(dirs: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for dir in dirs {
            std::fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        temp_dir
    }

    #[tokio::test]
    async fn test_resolve_existing_directory() {
        let storage = storage_with(&["vacation2021"]);
        let resolver = DirectoryResolver::new(storage.path());

        let request = resolve_request(&resolver, Some("vacation2021"))
            .await
            .unwrap();
        assert_eq!(request.id().as_str(), "vacation2021");
        assert_eq!(request.source_path(), storage.path().join("vacation2021"));
        assert_eq!(request.working_dir(), storage.path());
    }

    #[tokio::test]
    async fn test_resolve_missing_directory() {
        let storage = storage_with(&[]);
        let resolver = DirectoryResolver::new(storage.path());

        let err = resolve_request(&resolver, Some("doesnotexist"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_absent_identifier() {
        let storage = storage_with(&["a"]);
        let resolver = DirectoryResolver::new(storage.path());

        for raw in [None, Some("")] {
            let err = resolve_request(&resolver, raw).await.unwrap_err();
            assert!(matches!(err, ArchiveError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_plain_file() {
        let storage = storage_with(&[]);
        std::fs::write(storage.path().join("notes"), b"not a directory").unwrap();
        let resolver = DirectoryResolver::new(storage.path());

        assert!(resolve_request(&resolver, Some("notes")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let outside = storage_with(&["secret"]);
        let storage = storage_with(&[]);
        std::os::unix::fs::symlink(outside.path().join("secret"), storage.path().join("link"))
            .unwrap();
        let resolver = DirectoryResolver::new(storage.path());

        let err = resolve_request(&resolver, Some("link")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }
}
