use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures of a single archive download.
///
/// Every process-level failure is folded into one of these variants before it
/// leaves the subprocess layer. Only `Cancelled` is meant to travel upward
/// unchanged; the others are turned into a status code while the response is
/// still uncommitted, or into a truncated body afterwards.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive does not exist or was deleted: {0}")]
    NotFound(String),

    #[error("Failed to launch archiver '{program}': {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archiver exited with {}{}", describe_exit(.code), describe_stderr(.stderr))]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Transfer cancelled by client")]
    Cancelled,

    #[error("Unexpected transfer failure: {0}")]
    Unknown(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl ArchiveError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        ArchiveError::NotFound(reason.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ArchiveError::Cancelled)
    }

    /// Status to report while the response has not been committed yet.
    ///
    /// `None` for cancellation, which never becomes a status.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ArchiveError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            ArchiveError::Cancelled => None,
            ArchiveError::ProcessLaunch { .. }
            | ArchiveError::ProcessFailed { .. }
            | ArchiveError::Unknown(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        let status = self
            .status_code()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match &self {
            ArchiveError::NotFound(_) => "Archive does not exist or was deleted".to_string(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
