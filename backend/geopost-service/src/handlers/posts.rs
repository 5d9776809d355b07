/// Post handlers - HTTP endpoints for post operations
use crate::error::{AppError, Result};
use crate::middleware::{HeaderDeviceId, MaybeDeviceId};
use crate::models::{
    BoundingBox, GeoPoint, OwnPostResponse, PostPatch, PostSubmission, UpdatePostResponse,
};
use crate::services::PostService;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

/// Query string of the spatial listing endpoints. Values are kept as raw
/// strings so that missing and non-numeric input both produce a 400 with a
/// useful message.
#[derive(Debug, Default, Deserialize)]
pub struct SpatialQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub min_lon: Option<String>,
    pub min_lat: Option<String>,
    pub max_lon: Option<String>,
    pub max_lat: Option<String>,
}

impl SpatialQuery {
    fn has_bounds(&self) -> bool {
        self.min_lon.is_some()
            || self.min_lat.is_some()
            || self.max_lon.is_some()
            || self.max_lat.is_some()
    }

    fn point(&self) -> Result<GeoPoint> {
        if self.lat.is_none() || self.lng.is_none() {
            return Err(AppError::Validation(
                "Latitude (lat) and Longitude (lng) are required".to_string(),
            ));
        }
        GeoPoint::new(
            number("lat", self.lat.as_deref())?,
            number("lng", self.lng.as_deref())?,
        )
    }

    fn radius(&self) -> Result<Option<f64>> {
        self.radius
            .as_deref()
            .map(|raw| number("radius", Some(raw)))
            .transpose()
    }

    fn bounds(&self) -> Result<BoundingBox> {
        BoundingBox::new(
            number("min_lon", self.min_lon.as_deref())?,
            number("min_lat", self.min_lat.as_deref())?,
            number("max_lon", self.max_lon.as_deref())?,
            number("max_lat", self.max_lat.as_deref())?,
        )
    }
}

fn number(name: &str, raw: Option<&str>) -> Result<f64> {
    let raw = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("Missing query parameter '{}'", name)))?;

    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            AppError::Validation(format!("Query parameter '{}' must be a number", name))
        })
}

#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PostIdQuery {
    pub id: Option<String>,
}

/// List posts by location: a bounding box when any `min_*`/`max_*`
/// parameter is present, otherwise proximity around `lat`/`lng`
pub async fn list_posts(
    service: web::Data<PostService>,
    query: web::Query<SpatialQuery>,
) -> Result<HttpResponse> {
    if query.has_bounds() {
        let posts = service.list_in_bounds(query.bounds()?).await?;
        return Ok(HttpResponse::Ok().json(posts));
    }

    let posts = service.list_near(query.point()?, query.radius()?).await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Bounding-box listing only
pub async fn list_posts_in_bounds(
    service: web::Data<PostService>,
    query: web::Query<SpatialQuery>,
) -> Result<HttpResponse> {
    let posts = service.list_in_bounds(query.bounds()?).await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Most recent posts, public projection
pub async fn list_public_posts(
    service: web::Data<PostService>,
    query: web::Query<PublicQuery>,
) -> Result<HttpResponse> {
    let posts = service.list_public(query.limit).await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Caller's latest post, `{"post": null}` when there is none
pub async fn get_own_post(
    service: web::Data<PostService>,
    device: MaybeDeviceId,
) -> Result<HttpResponse> {
    let post = service.get_own_post(device.as_deref()).await?;
    Ok(HttpResponse::Ok().json(OwnPostResponse { post }))
}

pub async fn get_post_history(
    service: web::Data<PostService>,
    device: HeaderDeviceId,
) -> Result<HttpResponse> {
    let posts = service.list_history(device.0.as_str()).await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Create a new post
pub async fn create_post(
    service: web::Data<PostService>,
    device: MaybeDeviceId,
    req: web::Json<PostSubmission>,
) -> Result<HttpResponse> {
    let post = service
        .create_post(device.as_deref(), req.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(post))
}

/// Update comment / pixelAtPlace of an owned post (`?id=`)
pub async fn update_post(
    service: web::Data<PostService>,
    device: MaybeDeviceId,
    query: web::Query<PostIdQuery>,
    req: web::Json<PostPatch>,
) -> Result<HttpResponse> {
    let raw_id = query
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::Validation("Post ID query parameter (?id=X) is required".to_string())
        })?;
    let post_id = Uuid::parse_str(raw_id)
        .map_err(|_| AppError::Validation("Invalid post ID".to_string()))?;

    let post = service
        .update_post(device.as_deref(), post_id, req.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(UpdatePostResponse {
        success: true,
        id: post.id,
    }))
}
