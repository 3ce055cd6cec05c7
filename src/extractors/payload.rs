//! Request body as JSON, multipart (with file parts) or urlencoded form.

use crate::error::ApiError;
use crate::service::UploadedFile;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use serde_json::{Map, Value};

#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    /// Text fields arrive as strings and are coerced by the loader.
    Form {
        fields: Map<String, Value>,
        files: Vec<(String, UploadedFile)>,
    },
}

impl Payload {
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Payload::Empty => None,
            Payload::Json(v) => v.get(key),
            Payload::Form { fields, .. } => fields.get(key),
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }
}

#[async_trait]
impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::field("_body", e.body_text()))?;
            let mut fields = Map::new();
            let mut files = Vec::new();
            while let Some(field) = multipart.next_field().await? {
                let name = field.name().unwrap_or_default().to_string();
                if field.file_name().is_some() {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    files.push((
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes,
                        },
                    ));
                } else {
                    fields.insert(name, Value::String(field.text().await?));
                }
            }
            return Ok(Payload::Form { fields, files });
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::field("_body", e.body_text()))?;
            let fields = pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            return Ok(Payload::Form {
                fields,
                files: Vec::new(),
            });
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::field("_body", e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Payload::Empty);
        }
        serde_json::from_slice(&bytes)
            .map(Payload::Json)
            .map_err(|e| ApiError::field("_body", format!("invalid JSON: {}", e)))
    }
}
