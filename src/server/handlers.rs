use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::ServerState;
use crate::error::{ArchiveError, Result};
use crate::storage::resolve_request;
use crate::transfer::{body_channel, join_transfer, spawn_transfer};

pub(super) async fn start_archive_download(
    State(state): State<Arc<ServerState>>,
    Path(identifier): Path<String>,
) -> Response {
    download(&state, Some(&identifier))
        .await
        .unwrap_or_else(reject)
}

pub(super) async fn missing_identifier(State(state): State<Arc<ServerState>>) -> Response {
    download(&state, None).await.unwrap_or_else(reject)
}

/// Resolves and launches before anything is committed, so every failure up to
/// here still becomes a proper status.
async fn download(state: &ServerState, identifier: Option<&str>) -> Result<Response> {
    let request = resolve_request(state.resolver.as_ref(), identifier).await?;
    let source = state.launcher.launch(&request).await?;

    let id = request.id().clone();
    info!("Starting archive download for '{}'", id);

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_DISPOSITION, id.content_disposition()),
    ];

    let (sink, body) = body_channel();
    let handle = spawn_transfer(id.clone(), state.transfer, sink, source);
    // The response is already committed when the transfer ends, so its
    // outcome (including `Cancelled`) can only be observed off the request.
    tokio::spawn(join_transfer(id, handle));

    Ok((StatusCode::OK, headers, Body::from_stream(body)).into_response())
}

fn reject(err: ArchiveError) -> Response {
    match &err {
        ArchiveError::NotFound(reason) => warn!("Rejected archive request: {}", reason),
        other => error!("Failed to start archive download: {}", other),
    }
    err.into_response()
}

pub(super) async fn index_page(State(state): State<Arc<ServerState>>) -> Response {
    let Some(templates_dir) = state.templates_dir.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let path = templates_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Index page is unavailable").into_response()
        }
    }
}
