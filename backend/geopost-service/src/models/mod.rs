/// Data models for the geopost service
///
/// - `Post`: the full record, visible to the owning device only
/// - `PublicPost`: the projection served to everyone else
/// - `PostSubmission` / `PostPatch`: inbound shapes for create and update
/// - `GeoPoint` / `BoundingBox`: validated spatial inputs
///
/// Field names are camelCase on the wire. The snake_case column mapping
/// lives in `db::post_repo` and nowhere else.
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(format!(
                "Latitude must be a number between -90 and 90, got {}",
                lat
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Validation(format!(
                "Longitude must be a number between -180 and 180, got {}",
                lng
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance in metres (haversine, mean earth radius)
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// Mean earth radius used for every distance computation
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Axis-aligned region in degrees. Boxes crossing the antimeridian are not
/// supported: `min_lon` must not exceed `max_lon`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        // Corner validation reuses the point range checks.
        GeoPoint::new(min_lat, min_lon)?;
        GeoPoint::new(max_lat, max_lon)?;

        if min_lat > max_lat || min_lon > max_lon {
            return Err(AppError::Validation(
                "Map bounds must satisfy min <= max".to_string(),
            ));
        }

        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lng)
    }
}

/// A stored post, as seen by the device that created it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub owner_device_id: String,
    pub lat: f64,
    pub lng: f64,
    pub comment: Option<String>,
    pub image_url: Option<String>,
    /// Map center the owner was looking at when placing the post
    pub user_center: Option<Value>,
    /// Intrinsic image size as reported by the client
    pub natural_size: Option<Value>,
    pub pixel_at_place: f64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Post projection without owner-private fields
/// (`ownerDeviceId`, `userCenter`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPost {
    pub id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub image_url: Option<String>,
    pub comment: Option<String>,
    pub natural_size: Option<Value>,
    pub pixel_at_place: f64,
}

impl From<&Post> for PublicPost {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id,
            lat: post.lat,
            lng: post.lng,
            image_url: post.image_url.clone(),
            comment: post.comment.clone(),
            natural_size: post.natural_size.clone(),
            pixel_at_place: post.pixel_at_place,
        }
    }
}

impl From<Post> for PublicPost {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            lat: post.lat,
            lng: post.lng,
            image_url: post.image_url,
            comment: post.comment,
            natural_size: post.natural_size,
            pixel_at_place: post.pixel_at_place,
        }
    }
}

/// Client payload for creating a post. Older clients send `image_url`,
/// `natSize` and `pxAtPlace`; those names are still accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSubmission {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub comment: Option<String>,
    #[serde(alias = "image_url")]
    pub image_url: Option<String>,
    pub user_center: Option<Value>,
    #[serde(alias = "natSize")]
    pub natural_size: Option<Value>,
    #[serde(alias = "pxAtPlace")]
    pub pixel_at_place: Option<f64>,
}

/// Validated insert handed to the repository
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub owner_device_id: String,
    pub location: GeoPoint,
    pub comment: Option<String>,
    pub image_url: String,
    pub user_center: Option<Value>,
    pub natural_size: Option<Value>,
    pub pixel_at_place: f64,
}

/// Partial update. Absent (or null) fields are left unchanged; other body
/// fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub comment: Option<String>,
    #[serde(alias = "pxAtPlace")]
    pub pixel_at_place: Option<f64>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.pixel_at_place.is_none()
    }

    /// Apply to an in-memory record
    pub fn apply(&self, post: &mut Post) {
        if let Some(comment) = &self.comment {
            post.comment = Some(comment.clone());
        }
        if let Some(pixel_at_place) = self.pixel_at_place {
            post.pixel_at_place = pixel_at_place;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdatePostResponse {
    pub success: bool,
    pub id: Uuid,
}

/// Body of the "my post" endpoint; `post` is null when the caller has none
#[derive(Debug, Serialize)]
pub struct OwnPostResponse {
    pub post: Option<Post>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}
