/// Upload gateway - picks a collision-free key and hands bytes to object storage
use crate::error::{AppError, Result};
use crate::metrics::collectors::{UPLOADS_TOTAL, UPLOAD_BYTES};
use crate::storage::{ObjectStore, StoredObject};
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

/// A single file received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct UploadGateway {
    store: Arc<dyn ObjectStore>,
    max_bytes: usize,
}

impl UploadGateway {
    pub fn new(store: Arc<dyn ObjectStore>, max_bytes: usize) -> Self {
        Self { store, max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store the file and return its public URL.
    ///
    /// Every call writes a fresh key, so repeating an upload produces a new
    /// object rather than overwriting the previous one.
    pub async fn store(&self, file: UploadedFile) -> Result<String> {
        if file.bytes.is_empty() {
            UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::Validation("No file uploaded".to_string()));
        }
        if file.bytes.len() > self.max_bytes {
            UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::Validation(format!(
                "File exceeds maximum size of {} bytes",
                self.max_bytes
            )));
        }

        let key = object_key(file.file_name.as_deref());
        let content_type = file
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let size = file.bytes.len();

        if let Err(e) = self.store.put(&key, file.bytes, &content_type).await {
            UPLOADS_TOTAL.with_label_values(&["failed"]).inc();
            tracing::error!(key = %key, error = %e, "object store write failed");
            return Err(e);
        }

        UPLOADS_TOTAL.with_label_values(&["stored"]).inc();
        UPLOAD_BYTES.observe(size as f64);
        tracing::info!(key = %key, size, content_type = %content_type, "upload stored");

        Ok(self.store.public_url(&key))
    }

    /// Stored object for `key`, when this gateway's store serves its own URLs
    pub async fn fetch(&self, key: &str) -> Result<Option<StoredObject>> {
        self.store.fetch(key).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}

/// `{random}-{name}`, where `name` is the client file name reduced to a safe
/// final path component.
fn object_key(file_name: Option<&str>) -> String {
    format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name))
}

fn sanitize_file_name(file_name: Option<&str>) -> String {
    let base = file_name
        .and_then(|name| name.rsplit(|c: char| c == '/' || c == '\\').next())
        .unwrap_or("");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
