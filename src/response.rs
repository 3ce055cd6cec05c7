//! Standard response envelope helpers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Serialize)]
pub struct Success {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Success {
    pub fn new() -> Self {
        Success {
            status: "success",
            data: None,
            extra: Map::new(),
        }
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

impl Default for Success {
    fn default() -> Self {
        Success::new()
    }
}

impl IntoResponse for Success {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// `{"status": "success"}`.
pub fn success() -> Response {
    Success::new().into_response()
}

/// `{"status": "success", "data": ...}`.
pub fn success_data(data: Value) -> Response {
    Success::new().data(data).into_response()
}
