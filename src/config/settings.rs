//! Process settings from the environment (`.env` is loaded by the binary).

use crate::error::ConfigError;
use axum::http::HeaderName;
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_AUTH_TOKEN_HEADER: &str = "X-Academia-Auth-Token";

/// What the filter builder does with a field path it cannot resolve.
#[derive(Clone, Debug, PartialEq)]
pub enum UnknownFieldPolicy {
    /// Fail the request with `unknown_field`.
    Strict,
    /// Compare against this constant instead.
    Default(Value),
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub auth_token_header: HeaderName,
    pub cors_max_age: u64,
    pub password_hash_rounds: u32,
    pub password_pepper: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub session_ttl_hours: Option<i64>,
    pub db_max_connections: u32,
    pub unknown_field: UnknownFieldPolicy,
    pub reset_database: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/academia".into(),
            bind_addr: "0.0.0.0:8080".into(),
            auth_token_header: HeaderName::from_static("x-academia-auth-token"),
            cors_max_age: 691_200,
            password_hash_rounds: 256,
            password_pepper: String::new(),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 32 * 1024 * 1024,
            session_ttl_hours: None,
            db_max_connections: 5,
            unknown_field: UnknownFieldPolicy::Strict,
            reset_database: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();

        if let Some(url) = get("DATABASE_URL") {
            s.database_url = url;
        } else if let Some(db_name) = get("DB_NAME") {
            let user = get("POSTGRES_USER").unwrap_or_else(|| "postgres".into());
            let password = get("POSTGRES_PASSWORD").unwrap_or_default();
            let host = get("DB_HOST").unwrap_or_else(|| "db".into());
            s.database_url = format!("postgres://{}:{}@{}:5432/{}", user, password, host, db_name);
        }
        if let Some(addr) = get("BIND_ADDR") {
            s.bind_addr = addr;
        }
        if let Some(h) = get("AUTH_TOKEN_HEADER") {
            s.auth_token_header = HeaderName::from_str(&h).map_err(|e| ConfigError::Setting {
                name: "AUTH_TOKEN_HEADER",
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = get("CORS_MAX_AGE") {
            s.cors_max_age = parse_num("CORS_MAX_AGE", &v)?;
        }
        if let Some(v) = get("PASSWORD_HASH_ROUNDS") {
            s.password_hash_rounds = parse_num("PASSWORD_HASH_ROUNDS", &v)?;
            if s.password_hash_rounds == 0 {
                return Err(ConfigError::Setting {
                    name: "PASSWORD_HASH_ROUNDS",
                    reason: "must be at least 1".into(),
                });
            }
        }
        if let Some(v) = get("PASSWORD_PEPPER") {
            s.password_pepper = v;
        }
        if let Some(v) = get("UPLOAD_DIR") {
            s.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            s.max_upload_bytes = parse_num("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("SESSION_TTL_HOURS") {
            let hours: i64 = parse_num("SESSION_TTL_HOURS", &v)?;
            if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
                return Err(ConfigError::Setting {
                    name: "SESSION_TTL_HOURS",
                    reason: format!("must be between 1 and {}", MAX_SESSION_TTL_HOURS),
                });
            }
            s.session_ttl_hours = Some(hours);
        }
        if let Some(v) = get("DB_MAX_CONNECTIONS") {
            s.db_max_connections = parse_num("DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("FILTER_UNKNOWN_FIELD") {
            s.unknown_field = parse_unknown_field(&v)?;
        }
        if let Some(v) = get("RESET_DATABASE") {
            s.reset_database = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(s)
    }
}

/// A century.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366 * 100;

fn parse_num<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Setting {
        name,
        reason: e.to_string(),
    })
}

/// `strict`, or a JSON literal used as the default value (e.g. `null`).
fn parse_unknown_field(raw: &str) -> Result<UnknownFieldPolicy, ConfigError> {
    if raw.trim().eq_ignore_ascii_case("strict") {
        return Ok(UnknownFieldPolicy::Strict);
    }
    serde_json::from_str(raw)
        .map(UnknownFieldPolicy::Default)
        .map_err(|e| ConfigError::Setting {
            name: "FILTER_UNKNOWN_FIELD",
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.auth_token_header.as_str(), "x-academia-auth-token");
        assert_eq!(s.cors_max_age, 691_200);
        assert_eq!(s.unknown_field, UnknownFieldPolicy::Strict);
    }

    #[test]
    fn composes_database_url_from_parts() {
        let s = Settings::from_lookup(lookup(&[
            ("DB_NAME", "academia"),
            ("POSTGRES_USER", "alice"),
            ("POSTGRES_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(s.database_url, "postgres://alice:pw@db:5432/academia");
    }

    #[test]
    fn lenient_field_policy_takes_json_default() {
        let s = Settings::from_lookup(lookup(&[("FILTER_UNKNOWN_FIELD", "null")])).unwrap();
        assert_eq!(s.unknown_field, UnknownFieldPolicy::Default(Value::Null));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = Settings::from_lookup(lookup(&[("CORS_MAX_AGE", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Setting { name: "CORS_MAX_AGE", .. }));
    }

    #[test]
    fn session_ttl_must_be_a_sane_number_of_hours() {
        let s = Settings::from_lookup(lookup(&[("SESSION_TTL_HOURS", "72")])).unwrap();
        assert_eq!(s.session_ttl_hours, Some(72));
        for raw in ["0", "-5", "9223372036854775807"] {
            let err = Settings::from_lookup(lookup(&[("SESSION_TTL_HOURS", raw)])).unwrap_err();
            assert!(matches!(err, ConfigError::Setting { name: "SESSION_TTL_HOURS", .. }), "{raw}");
        }
    }
}
