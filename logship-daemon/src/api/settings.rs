//! Key/value settings handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::rules::decode_json;
use super::{ApiError, AppState};

/// Body of `PUT /api/settings/{key}`.
#[derive(Debug, Deserialize)]
pub(super) struct PutSettingRequest {
    value: String,
}

pub(super) async fn list_handler(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    Ok(Json(state.store.list_settings().await?))
}

pub(super) async fn put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if key.trim().is_empty() {
        return Err(ApiError::BadRequest("setting key must not be empty".to_owned()));
    }
    let request: PutSettingRequest = decode_json(&body)?;
    state.store.put_setting(key.clone(), request.value).await?;
    tracing::info!(key = %key, "setting updated");
    Ok(StatusCode::NO_CONTENT)
}
