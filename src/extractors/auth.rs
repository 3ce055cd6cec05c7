//! Current session from the auth-token header.

use crate::error::ApiError;
use crate::service::auth::{decode_token, lookup_session, CurrentUser};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Raw session token from the configured header; `None` when the header is absent.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthToken(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for AuthToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(&state.settings.auth_token_header)
            .map(|v| v.to_str().map_err(|_| ApiError::BadToken))
            .transpose()?
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match value {
            None => Ok(AuthToken(None)),
            Some(v) => decode_token(v).map(|t| AuthToken(Some(t))),
        }
    }
}

/// The logged-in user, if any. A token without a live session is `auth_failed`.
#[derive(Clone, Debug)]
pub struct Session(pub Option<CurrentUser>);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthToken(token) = AuthToken::from_request_parts(parts, state).await?;
        let Some(token) = token else {
            return Ok(Session(None));
        };
        let user = lookup_session(&state.pool, &state.catalog, &token, state.settings.session_ttl_hours)
            .await?
            .ok_or(ApiError::AuthFailed)?;
        Ok(Session(Some(user)))
    }
}
