/// Post service - validation, ownership, and public projection
use crate::config::PostsConfig;
use crate::db::PostRepository;
use crate::error::{AppError, Result};
use crate::metrics::collectors::{POSTS_CREATED_TOTAL, POST_UPDATES_TOTAL, SPATIAL_QUERIES_TOTAL};
use crate::models::{BoundingBox, GeoPoint, NewPost, Post, PostPatch, PostSubmission, PublicPost};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PostSettings {
    pub public_limit: i64,
    pub nearby_radius_m: f64,
    pub max_spatial_results: i64,
    pub default_pixel_at_place: f64,
}

impl Default for PostSettings {
    fn default() -> Self {
        PostSettings::from(&PostsConfig::default())
    }
}

impl From<&PostsConfig> for PostSettings {
    fn from(config: &PostsConfig) -> Self {
        Self {
            public_limit: config.public_limit,
            nearby_radius_m: config.nearby_radius_m,
            max_spatial_results: config.max_spatial_results,
            default_pixel_at_place: config.default_pixel_at_place,
        }
    }
}

/// Short, log-safe form of a device identifier
fn device_tag(device_id: &str) -> String {
    device_id.chars().take(8).collect()
}

fn present(device_id: Option<&str>) -> Option<&str> {
    device_id.map(str::trim).filter(|id| !id.is_empty())
}

fn finite_pixel_at_place(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AppError::Validation(
            "pixelAtPlace must be a finite number".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    settings: PostSettings,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepository>) -> Self {
        Self::with_settings(repo, PostSettings::default())
    }

    pub fn with_settings(repo: Arc<dyn PostRepository>, settings: PostSettings) -> Self {
        Self { repo, settings }
    }

    pub fn settings(&self) -> &PostSettings {
        &self.settings
    }

    /// Create a post owned by `device_id`. Coordinates and an image
    /// reference are required; `pixelAtPlace` falls back to the configured
    /// default (8).
    pub async fn create_post(&self, device_id: Option<&str>, fields: PostSubmission) -> Result<Post> {
        let device_id = present(device_id).ok_or_else(|| {
            AppError::AuthRequired("Device ID required for post creation".to_string())
        })?;

        let (lat, lng) = match (fields.lat, fields.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(AppError::Validation(
                    "Latitude (lat) and Longitude (lng) are required".to_string(),
                ))
            }
        };
        let location = GeoPoint::new(lat, lng)?;

        let image_url = fields
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::Validation("imageUrl is required".to_string()))?;

        let pixel_at_place = match fields.pixel_at_place {
            Some(value) => finite_pixel_at_place(value)?,
            None => self.settings.default_pixel_at_place,
        };

        let post = self
            .repo
            .insert(NewPost {
                owner_device_id: device_id.to_string(),
                location,
                comment: fields.comment,
                image_url,
                user_center: fields.user_center,
                natural_size: fields.natural_size,
                pixel_at_place,
            })
            .await?;

        POSTS_CREATED_TOTAL.inc();
        tracing::info!(post_id = %post.id, device = %device_tag(device_id), "post created");

        Ok(post)
    }

    /// Ownership-checked partial update of `comment` / `pixelAtPlace`.
    /// A missing post and a post owned by someone else both yield
    /// `NotFoundOrForbidden`.
    pub async fn update_post(
        &self,
        device_id: Option<&str>,
        id: Uuid,
        patch: PostPatch,
    ) -> Result<Post> {
        if patch.is_empty() {
            return Err(AppError::Validation(
                "No valid fields provided for update".to_string(),
            ));
        }
        if let Some(value) = patch.pixel_at_place {
            finite_pixel_at_place(value)?;
        }

        let device_id = present(device_id).ok_or_else(|| {
            AppError::AuthRequired("Device ID required for update verification".to_string())
        })?;

        match self.repo.update(id, device_id, &patch).await? {
            Some(post) => {
                POST_UPDATES_TOTAL.with_label_values(&["updated"]).inc();
                tracing::info!(post_id = %id, device = %device_tag(device_id), "post updated");
                Ok(post)
            }
            None => {
                POST_UPDATES_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::debug!(post_id = %id, device = %device_tag(device_id), "update matched no owned post");
                Err(AppError::NotFoundOrForbidden)
            }
        }
    }

    /// Most recent post owned by the caller. No identifier is not an error.
    pub async fn get_own_post(&self, device_id: Option<&str>) -> Result<Option<Post>> {
        let Some(device_id) = present(device_id) else {
            return Ok(None);
        };

        let mut posts = self.repo.find_by_owner(device_id, Some(1)).await?;
        Ok(posts.pop())
    }

    /// Every post owned by the caller, most recent first
    pub async fn list_history(&self, device_id: &str) -> Result<Vec<Post>> {
        let device_id = present(Some(device_id))
            .ok_or_else(|| AppError::Validation("Device ID header is missing".to_string()))?;

        self.repo.find_by_owner(device_id, None).await
    }

    /// Most recent posts, capped at the configured public limit
    pub async fn list_public(&self, limit: Option<i64>) -> Result<Vec<PublicPost>> {
        let cap = self.settings.public_limit.max(1);
        let limit = limit.map(|l| l.clamp(1, cap)).unwrap_or(cap);

        self.repo.find_recent(limit).await
    }

    /// Posts around `point`; `radius_m` defaults to the configured radius
    pub async fn list_near(&self, point: GeoPoint, radius_m: Option<f64>) -> Result<Vec<PublicPost>> {
        let radius_m = match radius_m {
            Some(r) if r.is_finite() && r > 0.0 => r,
            Some(r) => {
                return Err(AppError::Validation(format!(
                    "radius must be a positive number of metres, got {}",
                    r
                )))
            }
            None => self.settings.nearby_radius_m,
        };

        SPATIAL_QUERIES_TOTAL.with_label_values(&["near"]).inc();
        self.repo
            .find_near(&point, radius_m, self.settings.max_spatial_results)
            .await
    }

    pub async fn list_in_bounds(&self, bbox: BoundingBox) -> Result<Vec<PublicPost>> {
        SPATIAL_QUERIES_TOTAL.with_label_values(&["bounds"]).inc();
        self.repo
            .find_in_bounds(&bbox, self.settings.max_spatial_results)
            .await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.repo.health_check().await
    }
}
