//! Shared fixtures for the HTTP tests: the real route table wired to
//! in-memory collaborators, plus stores that always fail.
#![allow(dead_code)]

use actix_web::web;
use async_trait::async_trait;
use bytes::Bytes;
use geopost_service::config::IdentityConfig;
use geopost_service::db::{InMemoryPostRepository, PostRepository};
use geopost_service::error::{AppError, Result};
use geopost_service::handlers;
use geopost_service::models::{BoundingBox, GeoPoint, NewPost, Post, PostPatch, PublicPost};
use geopost_service::services::{PostService, UploadGateway};
use geopost_service::storage::{InMemoryObjectStore, ObjectStore};
use std::sync::Arc;
use uuid::Uuid;

pub const OBJECT_BASE_URL: &str = "http://objects.test/uploads";
pub const BOUNDARY: &str = "geopost-test-boundary";

pub struct TestContext {
    pub posts: web::Data<PostService>,
    pub uploads: web::Data<UploadGateway>,
    pub identity: web::Data<IdentityConfig>,
    pub repo: Arc<InMemoryPostRepository>,
    pub store: Arc<InMemoryObjectStore>,
}

impl TestContext {
    pub fn new() -> Self {
        let repo = Arc::new(InMemoryPostRepository::new());
        let store = Arc::new(InMemoryObjectStore::new(OBJECT_BASE_URL));
        Self {
            posts: web::Data::new(PostService::new(repo.clone())),
            uploads: web::Data::new(UploadGateway::new(store.clone(), 1024 * 1024)),
            identity: web::Data::new(IdentityConfig::default()),
            repo,
            store,
        }
    }

    /// Same wiring but with a post store that fails every call
    pub fn with_failing_repo() -> Self {
        let ctx = Self::new();
        Self {
            posts: web::Data::new(PostService::new(Arc::new(FailingRepository))),
            ..ctx
        }
    }

    /// Same wiring but with object storage that rejects every write
    pub fn with_failing_store() -> Self {
        let ctx = Self::new();
        Self {
            uploads: web::Data::new(UploadGateway::new(Arc::new(FailingStore), 1024 * 1024)),
            ..ctx
        }
    }

    pub fn configure(&self) -> impl FnOnce(&mut web::ServiceConfig) + 'static {
        let posts = self.posts.clone();
        let uploads = self.uploads.clone();
        let identity = self.identity.clone();
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(posts).app_data(uploads).app_data(identity);
            handlers::configure(cfg);
        }
    }
}

/// Multipart body with a single part named `name`
pub fn multipart_body(name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            name, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub struct FailingRepository;

fn down() -> AppError {
    AppError::Backend("connection refused".to_string())
}

#[async_trait]
impl PostRepository for FailingRepository {
    async fn insert(&self, _post: NewPost) -> Result<Post> {
        Err(down())
    }

    async fn get_by_id(&self, _id: Uuid) -> Result<Option<Post>> {
        Err(down())
    }

    async fn find_recent(&self, _limit: i64) -> Result<Vec<PublicPost>> {
        Err(down())
    }

    async fn find_by_owner(&self, _device_id: &str, _limit: Option<i64>) -> Result<Vec<Post>> {
        Err(down())
    }

    async fn find_in_bounds(&self, _bbox: &BoundingBox, _limit: i64) -> Result<Vec<PublicPost>> {
        Err(down())
    }

    async fn find_near(
        &self,
        _point: &GeoPoint,
        _radius_m: f64,
        _limit: i64,
    ) -> Result<Vec<PublicPost>> {
        Err(down())
    }

    async fn update(&self, _id: Uuid, _device_id: &str, _patch: &PostPatch) -> Result<Option<Post>> {
        Err(down())
    }

    async fn health_check(&self) -> Result<()> {
        Err(down())
    }
}

pub struct FailingStore;

#[async_trait]
impl ObjectStore for FailingStore {
    async fn put(&self, _key: &str, _body: Bytes, _content_type: &str) -> Result<()> {
        Err(AppError::Upload("bucket policy denies writes".to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", OBJECT_BASE_URL, key)
    }

    async fn health_check(&self) -> Result<()> {
        Err(AppError::Upload("bucket not found".to_string()))
    }
}
