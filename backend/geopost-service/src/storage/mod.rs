/// Object storage collaborators for uploaded images
use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use s3_utils::S3Client;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`. No retries: failures go straight back.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Publicly reachable URL for a stored key
    fn public_url(&self, key: &str) -> String;

    /// Read an object back. Stores whose URLs are served elsewhere (a bucket
    /// or CDN) return `None`.
    async fn fetch(&self, _key: &str) -> Result<Option<StoredObject>> {
        Ok(None)
    }

    async fn health_check(&self) -> Result<()>;
}

/// S3 (or S3-compatible) bucket
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object(key, body.to_vec(), content_type)
            .await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        self.client.public_url(key)
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health_check().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// Keeps objects in process memory; URLs are `{base_url}/{key}`
pub struct InMemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(AppError::Upload(format!("object {} already exists", key)));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.get(key).await)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
