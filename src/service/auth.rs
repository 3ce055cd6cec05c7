//! Password hashing, session tokens and the `_sessions` table.

use crate::config::{Catalog, Settings};
use crate::error::ApiError;
use crate::sql::quoted;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand::Rng;
use sqlx::{PgPool, Row};

pub const SESSIONS_TABLE: &str = "_sessions";

/// PBKDF2-HMAC-SHA256 over pepper and password, stored as a PHC string
/// (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`).
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    pepper: String,
    rounds: u32,
}

impl PasswordHasher {
    pub fn new(pepper: impl Into<String>, rounds: u32) -> Self {
        PasswordHasher {
            pepper: pepper.into(),
            rounds: rounds.max(1),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.password_pepper.clone(), settings.password_hash_rounds)
    }

    fn peppered(&self, password: &str) -> Vec<u8> {
        [self.pepper.as_bytes(), password.as_bytes()].concat()
    }

    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt: [u8; 16] = rand::rng().random();
        let salt = SaltString::encode_b64(&salt).map_err(|e| ApiError::Internal(format!("salt: {}", e)))?;
        let params = Params {
            rounds: self.rounds,
            output_length: 32,
        };
        let hash = Pbkdf2
            .hash_password_customized(&self.peppered(password), None, None, params, &salt)
            .map_err(|e| ApiError::Internal(format!("password hash: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Verifies against a stored hash, honoring the rounds it was made with.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Pbkdf2.verify_password(&self.peppered(password), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

/// Raw session token: 32 random bytes, hex.
pub fn mint_session_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// Client-facing form of a session token.
pub fn encode_token(raw: &str) -> String {
    general_purpose::STANDARD.encode(raw)
}

/// Header value to raw token. Accepts standard and URL-safe alphabets.
pub fn decode_token(header: &str) -> Result<String, ApiError> {
    let header = header.trim();
    let bytes = general_purpose::STANDARD
        .decode(header)
        .or_else(|_| general_purpose::URL_SAFE.decode(header))
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(header))
        .map_err(|_| ApiError::BadToken)?;
    let token = String::from_utf8(bytes).map_err(|_| ApiError::BadToken)?;
    if token.is_empty() {
        return Err(ApiError::BadToken);
    }
    Ok(token)
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    /// Raw session token of this request.
    pub token: String,
}

/// Checks a username/password pair; returns the user id.
pub async fn authenticate(
    pool: &PgPool,
    catalog: &Catalog,
    hasher: &PasswordHasher,
    username: &str,
    password: &str,
) -> Result<i64, ApiError> {
    let users = catalog.entity("user")?;
    let sql = format!(
        "SELECT {pk}::bigint AS id, {pw} AS password FROM {t} WHERE {un} = $1::text",
        pk = quoted(&users.pk),
        pw = quoted("password"),
        t = quoted(&users.table),
        un = quoted("username")
    );
    tracing::debug!(sql = %sql, "query");
    let row = sqlx::query(&sql).bind(username).fetch_optional(pool).await?;
    let Some(row) = row else {
        return Err(ApiError::IncorrectCredential);
    };
    let stored: Option<String> = row.try_get("password")?;
    match stored {
        Some(stored) if hasher.verify(password, &stored) => Ok(row.try_get("id")?),
        _ => Err(ApiError::IncorrectCredential),
    }
}

pub async fn create_session(pool: &PgPool, user_id: i64) -> Result<String, ApiError> {
    let token = mint_session_token();
    let sql = format!(
        "INSERT INTO {} (token, user_id) VALUES ($1::text, $2::bigint)",
        quoted(SESSIONS_TABLE)
    );
    sqlx::query(&sql).bind(&token).bind(user_id).execute(pool).await?;
    tracing::info!(user_id, "session created");
    Ok(token)
}

/// Live session for a raw token, joined with its user. Sessions older than the TTL
/// (when configured) are ignored.
pub async fn lookup_session(
    pool: &PgPool,
    catalog: &Catalog,
    token: &str,
    ttl_hours: Option<i64>,
) -> Result<Option<CurrentUser>, ApiError> {
    let users = catalog.entity("user")?;
    let sql = format!(
        "SELECT s.user_id::bigint AS user_id, u.{un} AS username FROM {s} s JOIN {u} u ON u.{pk} = s.user_id \
         WHERE s.token = $1::text AND ($2::timestamptz IS NULL OR s.created_at >= $2::timestamptz)",
        un = quoted("username"),
        s = quoted(SESSIONS_TABLE),
        u = quoted(&users.table),
        pk = quoted(&users.pk)
    );
    let cutoff = ttl_hours
        .and_then(Duration::try_hours)
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
    let row = sqlx::query(&sql).bind(token).bind(cutoff).fetch_optional(pool).await?;
    match row {
        None => Ok(None),
        Some(row) => Ok(Some(CurrentUser {
            id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            token: token.to_string(),
        })),
    }
}

pub async fn revoke_session(pool: &PgPool, token: &str) -> Result<bool, ApiError> {
    let sql = format!("DELETE FROM {} WHERE token = $1::text", quoted(SESSIONS_TABLE));
    let done = sqlx::query(&sql).bind(token).execute(pool).await?;
    if done.rows_affected() > 0 {
        tracing::info!("session revoked");
    }
    Ok(done.rows_affected() > 0)
}
