use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Leading alphanumeric keeps `.`, `..` and hidden names out.
static ARCHIVE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid archive id regex"));

/// A validated archive identifier, safe to join onto the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveId(String);

impl ArchiveId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ArchiveError::not_found("empty archive identifier"));
        }
        if !ARCHIVE_ID_PATTERN.is_match(raw) {
            return Err(ArchiveError::not_found(format!(
                "invalid archive identifier '{raw}'"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name offered to the client, e.g. `vacation2021.zip`.
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.0)
    }

    /// Value of the `Content-Disposition` header for this archive.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.archive_file_name())
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resolved download: which archive, and which directory it is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    id: ArchiveId,
    source_path: PathBuf,
}

impl ArchiveRequest {
    pub fn new(id: ArchiveId, source_path: PathBuf) -> Self {
        Self { id, source_path }
    }

    pub fn id(&self) -> &ArchiveId {
        &self.id
    }

    /// The directory being archived.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Directory the archiver runs in: the parent of the source directory.
    pub fn working_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Relative name handed to the archiver: the last component of the
    /// source directory, so it always matches `working_dir`.
    pub fn archive_name(&self) -> &str {
        self.source_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_else(|| self.id.as_str())
    }
}
