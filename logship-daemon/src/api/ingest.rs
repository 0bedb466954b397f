//! `POST /ingest` handler.

use std::error::Error as StdError;
use std::net::SocketAddr;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use http_body_util::LengthLimitError;
use serde_json::json;

use super::{ApiError, AppState};

pub(super) async fn ingest_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    if declared_length(&headers).is_some_and(|len| len > state.max_body_bytes) {
        return Err(ApiError::PayloadTooLarge);
    }

    let bytes = read_body(body, &state).await?;
    let peer_ip = peer.ip().to_string();
    let accepted = state.ingestor.ingest_http(&bytes, &peer_ip).await?;

    tracing::debug!(peer = %peer_ip, accepted, "http ingest accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "accepted": accepted })),
    ))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Read the whole body within the size limit and deadline.
async fn read_body(body: Body, state: &AppState) -> Result<Bytes, ApiError> {
    let read = axum::body::to_bytes(body, state.max_body_bytes);
    match tokio::time::timeout(state.body_timeout, read).await {
        Err(_) => Err(ApiError::RequestTimeout),
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) if exceeded_limit(&e) => Err(ApiError::PayloadTooLarge),
        Ok(Err(e)) => Err(ApiError::BadRequest(format!("failed to read body: {e}"))),
    }
}

fn exceeded_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err as &(dyn StdError + 'static));
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}
