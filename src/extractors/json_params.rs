//! `?json_params=<base64 JSON>` into `FilterParams`.

use crate::error::ApiError;
use crate::sql::FilterParams;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawQuery {
    json_params: Option<String>,
}

/// Filter parameters of the request; default when `json_params` is absent.
#[derive(Clone, Debug, Default)]
pub struct JsonParams(pub FilterParams);

/// Base64 (standard or URL-safe) of a JSON object. A `+` turned into a space by
/// query-string decoding is restored first.
pub fn decode_json_params(raw: &str) -> Result<FilterParams, ApiError> {
    let raw = raw.trim().replace(' ', "+");
    let bytes = general_purpose::STANDARD
        .decode(&raw)
        .or_else(|_| general_purpose::URL_SAFE.decode(&raw))
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(&raw))
        .map_err(|e| ApiError::BadJsonParams(format!("not base64: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadJsonParams(e.to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for JsonParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(q) = Query::<RawQuery>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::BadJsonParams(e.body_text()))?;
        match q.json_params.as_deref().filter(|s| !s.trim().is_empty()) {
            None => Ok(JsonParams::default()),
            Some(raw) => decode_json_params(raw).map(JsonParams),
        }
    }
}
