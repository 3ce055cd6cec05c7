//! Typed errors and HTTP mapping.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to validation messages, as carried by `arg_fmt` errors.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key on entity {entity}: {reason}")]
    InvalidPrimaryKey { entity: String, reason: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("setting {name}: {reason}")]
    Setting { name: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("authentication failed")]
    AuthFailed,
    #[error("login required")]
    LoginRequired,
    #[error("incorrect credential")]
    IncorrectCredential,
    #[error("permission denied")]
    PermDenied,
    #[error("argument format: {0:?}")]
    ArgFmt(FieldErrors),
    #[error("{0}")]
    Logic(String),
    #[error("unknown query operator: {0}")]
    UnknownQueryOper(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("bad auth token")]
    BadToken,
    #[error("bad json params: {0}")]
    BadJsonParams(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    /// `arg_fmt` error for a single field.
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.into()]);
        ApiError::ArgFmt(errors)
    }

    pub fn logic(reason: impl Into<String>) -> Self {
        ApiError::Logic(reason.into())
    }

    /// Database errors that are the caller's fault are reclassified; the rest stay internal.
    fn classify_db(e: &sqlx::Error) -> Option<(StatusCode, &'static str, Map<String, Value>)> {
        match e {
            sqlx::Error::RowNotFound => Some((StatusCode::NOT_FOUND, "not_found", Map::new())),
            sqlx::Error::Database(db) => {
                let reason = match db.code().as_deref() {
                    Some("23505") => "duplicate value",
                    Some("23503") => "referenced entity does not exist",
                    Some("23502") => "missing required value",
                    _ => return None,
                };
                let mut ctx = Map::new();
                ctx.insert("reason".into(), Value::String(reason.into()));
                if let Some(c) = db.constraint() {
                    ctx.insert("constraint".into(), Value::String(c.to_string()));
                }
                Some((StatusCode::BAD_REQUEST, "logic", ctx))
            }
            _ => None,
        }
    }

    /// Status, error type and extra body keys.
    pub fn parts(&self) -> (StatusCode, &'static str, Map<String, Value>) {
        let mut ctx = Map::new();
        let (status, kind) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::AuthFailed => (StatusCode::UNAUTHORIZED, "auth_failed"),
            ApiError::LoginRequired => (StatusCode::UNAUTHORIZED, "login_required"),
            ApiError::IncorrectCredential => (StatusCode::UNAUTHORIZED, "incorrect_credential"),
            ApiError::PermDenied => (StatusCode::FORBIDDEN, "perm_denied"),
            ApiError::ArgFmt(errors) => {
                ctx.insert("errors".into(), serde_json::to_value(errors).unwrap_or(Value::Null));
                (StatusCode::BAD_REQUEST, "arg_fmt")
            }
            ApiError::Logic(reason) => {
                ctx.insert("reason".into(), Value::String(reason.clone()));
                (StatusCode::BAD_REQUEST, "logic")
            }
            ApiError::UnknownQueryOper(oper) => {
                ctx.insert("oper".into(), Value::String(oper.clone()));
                (StatusCode::BAD_REQUEST, "unknown_query_oper")
            }
            ApiError::UnknownField(field) => {
                ctx.insert("field".into(), Value::String(field.clone()));
                (StatusCode::BAD_REQUEST, "unknown_field")
            }
            ApiError::BadToken => (StatusCode::BAD_REQUEST, "bad_token"),
            ApiError::BadJsonParams(reason) => {
                ctx.insert("reason".into(), Value::String(reason.clone()));
                (StatusCode::BAD_REQUEST, "bad_json_params")
            }
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            ApiError::Db(e) => match Self::classify_db(e) {
                Some(parts) => return parts,
                None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            ApiError::Config(_) | ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        (status, kind, ctx)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(format!("io: {}", e))
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::field("_body", format!("invalid multipart body: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, ctx) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, debug = ?self, "internal error");
        } else {
            tracing::debug!(error = %self, "request failed");
        }
        let mut body = Map::new();
        body.insert("status".into(), Value::String("failed".into()));
        body.insert("type".into(), Value::String(kind.into()));
        body.extend(ctx);
        (status, Json(Value::Object(body))).into_response()
    }
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_fmt_carries_field_errors() {
        let (status, kind, ctx) = ApiError::field("email", "must be a valid email").parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(kind, "arg_fmt");
        assert_eq!(ctx["errors"]["email"][0], "must be a valid email");
    }

    #[test]
    fn internal_errors_are_opaque() {
        let (status, kind, ctx) = ApiError::Internal("disk on fire".into()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(kind, "internal");
        assert!(ctx.is_empty());
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let (status, kind, _) = ApiError::Db(sqlx::Error::RowNotFound).parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(kind, "not_found");
    }
}
