/// Post storage layer
///
/// `PostRepository` is the only seam between the post service and the
/// store. Two implementations ship:
/// - `PgPostRepository`: PostgreSQL + PostGIS, spatial filtering in SQL
/// - `InMemoryPostRepository`: grid-indexed store for local runs and tests
pub mod memory;
pub mod post_repo;

pub use memory::InMemoryPostRepository;
pub use post_repo::PgPostRepository;

use crate::error::Result;
use crate::models::{BoundingBox, GeoPoint, NewPost, Post, PostPatch, PublicPost};
use async_trait::async_trait;
use uuid::Uuid;

/// Storage contract for posts. Every call is atomic: callers never observe
/// a partially applied write.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Store a new post; the store assigns `id` and `created_at`
    async fn insert(&self, post: NewPost) -> Result<Post>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>>;

    /// Most recent posts first
    async fn find_recent(&self, limit: i64) -> Result<Vec<PublicPost>>;

    /// Posts created by `device_id`, most recent first. `None` returns all.
    async fn find_by_owner(&self, device_id: &str, limit: Option<i64>) -> Result<Vec<Post>>;

    /// Posts inside `bbox` (edges inclusive), most recent first
    async fn find_in_bounds(&self, bbox: &BoundingBox, limit: i64) -> Result<Vec<PublicPost>>;

    /// Posts within `radius_m` metres of `point`, nearest first, ties by id
    async fn find_near(&self, point: &GeoPoint, radius_m: f64, limit: i64)
        -> Result<Vec<PublicPost>>;

    /// Conditional update: applies `patch` only when the row exists and is
    /// owned by `device_id`, as a single operation. Returns `None` when no
    /// row matched.
    async fn update(&self, id: Uuid, device_id: &str, patch: &PostPatch) -> Result<Option<Post>>;

    /// Cheap liveness probe used by the health endpoints
    async fn health_check(&self) -> Result<()>;
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &sqlx::PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    tracing::debug!("Running geopost-service migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed successfully");
    Ok(())
}
