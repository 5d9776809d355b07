use super::PostRepository;
use crate::error::Result;
use crate::models::{BoundingBox, GeoPoint, NewPost, Post, PostPatch, PublicPost};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

// Column lists for the two projections. These and the row structs below are
// the only place persisted (snake_case) names appear.
const POST_COLUMNS: &str = "id, device_id, lat, lng, comment, image_url, user_center, \
                            natural_size, pixel_at_place, created_at";
const PUBLIC_COLUMNS: &str = "id, lat, lng, image_url, comment, natural_size, pixel_at_place";

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    device_id: String,
    lat: f64,
    lng: f64,
    comment: Option<String>,
    image_url: Option<String>,
    user_center: Option<Value>,
    natural_size: Option<Value>,
    pixel_at_place: f64,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            owner_device_id: row.device_id,
            lat: row.lat,
            lng: row.lng,
            comment: row.comment,
            image_url: row.image_url,
            user_center: row.user_center,
            natural_size: row.natural_size,
            pixel_at_place: row.pixel_at_place,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PublicPostRow {
    id: Uuid,
    lat: f64,
    lng: f64,
    image_url: Option<String>,
    comment: Option<String>,
    natural_size: Option<Value>,
    pixel_at_place: f64,
}

impl From<PublicPostRow> for PublicPost {
    fn from(row: PublicPostRow) -> Self {
        PublicPost {
            id: row.id,
            lat: row.lat,
            lng: row.lng,
            image_url: row.image_url,
            comment: row.comment,
            natural_size: row.natural_size,
            pixel_at_place: row.pixel_at_place,
        }
    }
}

/// PostgreSQL/PostGIS post store
#[derive(Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn insert(&self, post: NewPost) -> Result<Post> {
        let sql = format!(
            r#"
            INSERT INTO posts (device_id, lat, lng, location, comment, image_url,
                               user_center, natural_size, pixel_at_place)
            VALUES ($1, $2, $3, ST_SetSRID(ST_MakePoint($3, $2), 4326)::geography,
                    $4, $5, $6, $7, $8)
            RETURNING {POST_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(&post.owner_device_id)
            .bind(post.location.lat)
            .bind(post.location.lng)
            .bind(&post.comment)
            .bind(&post.image_url)
            .bind(&post.user_center)
            .bind(&post.natural_size)
            .bind(post.pixel_at_place)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Post::from))
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<PublicPost>> {
        let sql = format!(
            r#"
            SELECT {PUBLIC_COLUMNS}
            FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#
        );

        let rows = sqlx::query_as::<_, PublicPostRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(PublicPost::from).collect())
    }

    async fn find_by_owner(&self, device_id: &str, limit: Option<i64>) -> Result<Vec<Post>> {
        // LIMIT NULL means no limit in PostgreSQL
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE device_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        );

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(device_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn find_in_bounds(&self, bbox: &BoundingBox, limit: i64) -> Result<Vec<PublicPost>> {
        let sql = format!(
            r#"
            SELECT {PUBLIC_COLUMNS}
            FROM posts
            WHERE location::geometry && ST_MakeEnvelope($1, $2, $3, $4, 4326)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#
        );

        let rows = sqlx::query_as::<_, PublicPostRow>(&sql)
            .bind(bbox.min_lon)
            .bind(bbox.min_lat)
            .bind(bbox.max_lon)
            .bind(bbox.max_lat)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(rows = rows.len(), "bounding box query");
        Ok(rows.into_iter().map(PublicPost::from).collect())
    }

    async fn find_near(
        &self,
        point: &GeoPoint,
        radius_m: f64,
        limit: i64,
    ) -> Result<Vec<PublicPost>> {
        let sql = format!(
            r#"
            SELECT {PUBLIC_COLUMNS}
            FROM posts
            WHERE ST_DWithin(location, ST_SetSRID(ST_MakePoint($2, $1), 4326)::geography, $3)
            ORDER BY ST_Distance(location, ST_SetSRID(ST_MakePoint($2, $1), 4326)::geography) ASC,
                     id ASC
            LIMIT $4
            "#
        );

        let rows = sqlx::query_as::<_, PublicPostRow>(&sql)
            .bind(point.lat)
            .bind(point.lng)
            .bind(radius_m)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(rows = rows.len(), radius_m, "proximity query");
        Ok(rows.into_iter().map(PublicPost::from).collect())
    }

    async fn update(&self, id: Uuid, device_id: &str, patch: &PostPatch) -> Result<Option<Post>> {
        let sql = format!(
            r#"
            UPDATE posts
            SET comment = COALESCE($3, comment),
                pixel_at_place = COALESCE($4, pixel_at_place)
            WHERE id = $1 AND device_id = $2
            RETURNING {POST_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .bind(device_id)
            .bind(&patch.comment)
            .bind(patch.pixel_at_place)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Post::from))
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_mapping_renames_owner_column() {
        let row = PostRow {
            id: Uuid::new_v4(),
            device_id: "dev1".to_string(),
            lat: 1.0,
            lng: 2.0,
            comment: None,
            image_url: Some("http://x/img.png".to_string()),
            user_center: Some(json!({"lat": 1.0})),
            natural_size: None,
            pixel_at_place: 8.0,
            created_at: Utc::now(),
        };
        let id = row.id;

        let post = Post::from(row);
        assert_eq!(post.id, id);
        assert_eq!(post.owner_device_id, "dev1");
        assert_eq!(post.user_center, Some(json!({"lat": 1.0})));
    }

    /// Runs against a real PostGIS database:
    /// `DATABASE_URL=postgres://... cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let pool = PgPool::connect(&url).await.expect("connect postgres");
        crate::db::run_migrations(&pool).await.expect("migrations");
        let repo = PgPostRepository::new(pool);

        let device = format!("test-{}", Uuid::new_v4());
        let created = repo
            .insert(NewPost {
                owner_device_id: device.clone(),
                location: GeoPoint::new(40.0, -73.0).unwrap(),
                comment: Some("hello".to_string()),
                image_url: "http://x/img.png".to_string(),
                user_center: None,
                natural_size: Some(json!([1, 2])),
                pixel_at_place: 8.0,
            })
            .await
            .unwrap();

        let near = repo
            .find_near(&GeoPoint::new(40.0005, -73.0).unwrap(), 500.0, 50)
            .await
            .unwrap();
        assert!(near.iter().any(|p| p.id == created.id));

        let denied = repo
            .update(created.id, "someone-else", &PostPatch {
                comment: Some("hack".to_string()),
                pixel_at_place: None,
            })
            .await
            .unwrap();
        assert!(denied.is_none());

        let updated = repo
            .update(created.id, &device, &PostPatch {
                comment: Some("hi".to_string()),
                pixel_at_place: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.comment.as_deref(), Some("hi"));
        assert_eq!(updated.natural_size, Some(json!([1, 2])));
    }
}
