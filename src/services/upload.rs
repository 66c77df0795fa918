//! Image uploads to local disk
//!
//! Files are stored flat under `upload.path` with a uuid name and served
//! back from `/uploads/<name>`.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;

pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, thiserror::Error)]
pub enum UploadServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

pub struct UploadService {
    config: UploadConfig,
}

impl UploadService {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.path
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    /// Validate and store one image
    pub async fn store_image(
        &self,
        original_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredFile, UploadServiceError> {
        let content_type = content_type.trim().to_lowercase();
        if !self.config.is_type_allowed(&content_type) {
            return Err(UploadServiceError::ValidationError(format!(
                "Invalid file type: {}. Allowed types: {}",
                content_type,
                self.config.allowed_types.join(", ")
            )));
        }
        if data.is_empty() {
            return Err(UploadServiceError::ValidationError(
                "File is empty".to_string(),
            ));
        }
        if data.len() as u64 > self.config.max_file_size {
            return Err(UploadServiceError::ValidationError(format!(
                "File too large. Maximum size: {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }

        let extension = self.config.get_extension(&content_type);
        if let Some(given) = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
        {
            if !extension_matches(&given, extension) {
                return Err(UploadServiceError::ValidationError(format!(
                    "File extension .{} does not match {}",
                    given, content_type
                )));
            }
        }

        fs::create_dir_all(&self.config.path)
            .await
            .with_context(|| format!("Failed to create {}", self.config.path.display()))?;

        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.config.path.join(&filename);
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(file = %filename, size = data.len(), "Image uploaded");
        Ok(StoredFile {
            url: format!("{}/{}", PUBLIC_PREFIX, filename),
            filename,
            size: data.len() as u64,
            content_type,
        })
    }
}

fn extension_matches(given: &str, canonical: &str) -> bool {
    given == canonical || (canonical == "jpg" && given == "jpeg")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &Path) -> UploadService {
        UploadService::new(&UploadConfig {
            path: dir.join("uploads"),
            max_file_size: 1024,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_store_image() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let stored = service
            .store_image("photo.JPEG", "image/jpeg", b"\xff\xd8\xff fake jpeg")
            .await
            .unwrap();
        assert!(stored.url.starts_with("/uploads/"));
        assert!(stored.filename.ends_with(".jpg"));

        let on_disk = service.upload_dir().join(&stored.filename);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"\xff\xd8\xff fake jpeg");
    }

    #[tokio::test]
    async fn test_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        for (name, mime, data) in [
            ("script.js", "text/javascript", b"alert(1)".to_vec()),
            ("empty.png", "image/png", Vec::new()),
            ("huge.png", "image/png", vec![0u8; 2048]),
            ("disguised.exe", "image/png", b"MZ".to_vec()),
        ] {
            assert!(
                matches!(
                    service.store_image(name, mime, &data).await,
                    Err(UploadServiceError::ValidationError(_))
                ),
                "{} should be rejected",
                name
            );
        }
        assert!(!service.upload_dir().exists());
    }
}
