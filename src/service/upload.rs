//! Uploaded files on local disk.

use crate::error::ApiError;
use axum::body::Bytes;
use std::path::{Path, PathBuf};

/// A file part of a multipart request.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        UploadStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the file under a fresh uuid name keeping the original extension; returns the stored name.
    pub async fn save(&self, file: &UploadedFile) -> Result<String, ApiError> {
        let ext = file
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()));
        let name = match ext {
            Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext.to_ascii_lowercase()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&name), &file.bytes).await?;
        tracing::debug!(stored = %name, bytes = file.bytes.len(), "upload saved");
        Ok(name)
    }

    /// Stored names are plain file names; anything else is treated as missing.
    fn resolve(&self, stored: &str) -> Option<PathBuf> {
        let plain = !stored.is_empty()
            && Path::new(stored).file_name().and_then(|n| n.to_str()) == Some(stored)
            && stored != ".."
            && stored != ".";
        plain.then(|| self.dir.join(stored))
    }

    pub async fn read(&self, stored: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.resolve(stored).ok_or(ApiError::NotFound)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Best effort: a failed removal is logged, not returned.
    pub async fn remove(&self, stored: &str) {
        let Some(path) = self.resolve(stored) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(stored = %stored, error = %e, "could not remove upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> UploadStore {
        UploadStore::new(std::env::temp_dir().join(format!("academia-uploads-{}", uuid::Uuid::new_v4())))
    }

    #[tokio::test]
    async fn save_read_remove() {
        let store = temp_store();
        let file = UploadedFile {
            file_name: Some("Paper.PDF".into()),
            content_type: Some("application/pdf".into()),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        };
        let name = store.save(&file).await.unwrap();
        assert!(name.ends_with(".pdf"));
        assert_eq!(store.read(&name).await.unwrap(), b"%PDF-1.4");
        store.remove(&name).await;
        assert!(matches!(store.read(&name).await, Err(ApiError::NotFound)));
        let _ = tokio::fs::remove_dir_all(store.dir()).await;
    }

    #[tokio::test]
    async fn path_traversal_is_not_found() {
        let store = temp_store();
        assert!(matches!(store.read("../etc/passwd").await, Err(ApiError::NotFound)));
        assert!(matches!(store.read("..").await, Err(ApiError::NotFound)));
    }
}
