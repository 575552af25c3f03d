//! API-key guard for write/admin endpoints.
//!
//! Outside production the key is optional: when none is configured every
//! request passes. Production refuses to boot without a key (see config),
//! and here rejects missing or mismatched headers.

use super::AppState;
use crate::error::ApiError;
use axum::http::HeaderMap;

pub fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return Err(ApiError::AuthRequired);
    }
    Ok(())
}
