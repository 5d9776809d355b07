/// In-process post store with a uniform lat/lng grid as spatial index.
///
/// Used when `POST_STORE=memory` and by the test suites. Writes take the
/// state lock exclusively, so each repository call is atomic.
use super::PostRepository;
use crate::error::Result;
use crate::models::{
    BoundingBox, GeoPoint, NewPost, Post, PostPatch, PublicPost, EARTH_RADIUS_M,
};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default grid cell edge, in degrees (roughly 11 km of latitude)
const DEFAULT_CELL_DEG: f64 = 0.1;

/// Relative widening of the search envelope against float rounding
const ENVELOPE_MARGIN: f64 = 1.0 + 1e-6;

type Cell = (i32, i32);

struct StoredPost {
    post: Post,
    /// Insertion order; breaks `created_at` ties
    seq: u64,
}

#[derive(Default)]
struct MemoryState {
    posts: HashMap<Uuid, StoredPost>,
    grid: HashMap<Cell, Vec<Uuid>>,
    next_seq: u64,
}

pub struct InMemoryPostRepository {
    state: RwLock<MemoryState>,
    cell_deg: f64,
}

impl Default for InMemoryPostRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        Self::with_cell_size(DEFAULT_CELL_DEG)
    }

    pub fn with_cell_size(cell_deg: f64) -> Self {
        assert!(cell_deg > 0.0, "grid cell size must be positive");
        Self {
            state: RwLock::new(MemoryState::default()),
            cell_deg,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.posts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn cell_of(&self, point: &GeoPoint) -> Cell {
        (
            (point.lat / self.cell_deg).floor() as i32,
            (point.lng / self.cell_deg).floor() as i32,
        )
    }

    /// Cells covering the given region, or `None` when walking the grid
    /// would cost more than scanning `total` posts.
    fn cells_covering(&self, bbox: &BoundingBox, total: usize) -> Option<Vec<Cell>> {
        let (lat_lo, lng_lo) = self.cell_of(&GeoPoint {
            lat: bbox.min_lat,
            lng: bbox.min_lon,
        });
        let (lat_hi, lng_hi) = self.cell_of(&GeoPoint {
            lat: bbox.max_lat,
            lng: bbox.max_lon,
        });

        let count = (lat_hi - lat_lo + 1) as usize * (lng_hi - lng_lo + 1) as usize;
        if count > total {
            return None;
        }

        let mut cells = Vec::with_capacity(count);
        for lat in lat_lo..=lat_hi {
            for lng in lng_lo..=lng_hi {
                cells.push((lat, lng));
            }
        }
        Some(cells)
    }

    fn candidates<'a>(&self, state: &'a MemoryState, bbox: &BoundingBox) -> Vec<&'a StoredPost> {
        match self.cells_covering(bbox, state.posts.len()) {
            Some(cells) => cells
                .iter()
                .filter_map(|cell| state.grid.get(cell))
                .flatten()
                .filter_map(|id| state.posts.get(id))
                .collect(),
            None => state.posts.values().collect(),
        }
    }
}

/// Region guaranteed to contain every point within `radius_m` of `center`,
/// or `None` when it would wrap a pole or the antimeridian.
///
/// The longitude half-width is the widest point of the spherical cap, which
/// lies poleward of the centre's parallel.
fn radius_envelope(center: &GeoPoint, radius_m: f64) -> Option<BoundingBox> {
    let angular = radius_m / EARTH_RADIUS_M;
    let cos_lat = center.lat.to_radians().cos();
    if angular >= std::f64::consts::FRAC_PI_2 || cos_lat <= f64::EPSILON {
        return None;
    }
    let sin_ratio = angular.sin() / cos_lat;
    if sin_ratio >= 1.0 {
        // cap reaches a pole
        return None;
    }

    let d_lat = angular.to_degrees() * ENVELOPE_MARGIN;
    let d_lng = sin_ratio.asin().to_degrees() * ENVELOPE_MARGIN;

    let (min_lat, max_lat) = (center.lat - d_lat, center.lat + d_lat);
    let (min_lng, max_lng) = (center.lng - d_lng, center.lng + d_lng);

    if min_lat < -90.0 || max_lat > 90.0 || min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }

    Some(BoundingBox {
        min_lon: min_lng,
        min_lat,
        max_lon: max_lng,
        max_lat,
    })
}

fn newest_first(a: &StoredPost, b: &StoredPost) -> Ordering {
    b.post
        .created_at
        .cmp(&a.post.created_at)
        .then(b.seq.cmp(&a.seq))
}

fn clamp_limit(limit: i64) -> usize {
    limit.max(0) as usize
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn insert(&self, new_post: NewPost) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            owner_device_id: new_post.owner_device_id,
            lat: new_post.location.lat,
            lng: new_post.location.lng,
            comment: new_post.comment,
            image_url: Some(new_post.image_url),
            user_center: new_post.user_center,
            natural_size: new_post.natural_size,
            pixel_at_place: new_post.pixel_at_place,
            created_at: Utc::now(),
        };
        let cell = self.cell_of(&post.location());

        let mut state = self.state.write().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.grid.entry(cell).or_default().push(post.id);
        state.posts.insert(
            post.id,
            StoredPost {
                post: post.clone(),
                seq,
            },
        );

        Ok(post)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        let state = self.state.read().await;
        Ok(state.posts.get(&id).map(|stored| stored.post.clone()))
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<PublicPost>> {
        let state = self.state.read().await;
        let mut posts: Vec<&StoredPost> = state.posts.values().collect();
        posts.sort_by(|a, b| newest_first(a, b));

        Ok(posts
            .into_iter()
            .take(clamp_limit(limit))
            .map(|stored| PublicPost::from(&stored.post))
            .collect())
    }

    async fn find_by_owner(&self, device_id: &str, limit: Option<i64>) -> Result<Vec<Post>> {
        let state = self.state.read().await;
        let mut posts: Vec<&StoredPost> = state
            .posts
            .values()
            .filter(|stored| stored.post.owner_device_id == device_id)
            .collect();
        posts.sort_by(|a, b| newest_first(a, b));

        let take = limit.map(clamp_limit).unwrap_or(usize::MAX);
        Ok(posts
            .into_iter()
            .take(take)
            .map(|stored| stored.post.clone())
            .collect())
    }

    async fn find_in_bounds(&self, bbox: &BoundingBox, limit: i64) -> Result<Vec<PublicPost>> {
        let state = self.state.read().await;
        let mut posts: Vec<&StoredPost> = self
            .candidates(&state, bbox)
            .into_iter()
            .filter(|stored| bbox.contains(&stored.post.location()))
            .collect();
        posts.sort_by(|a, b| newest_first(a, b));

        Ok(posts
            .into_iter()
            .take(clamp_limit(limit))
            .map(|stored| PublicPost::from(&stored.post))
            .collect())
    }

    async fn find_near(
        &self,
        point: &GeoPoint,
        radius_m: f64,
        limit: i64,
    ) -> Result<Vec<PublicPost>> {
        let state = self.state.read().await;

        let candidates = match radius_envelope(point, radius_m) {
            Some(envelope) => self.candidates(&state, &envelope),
            None => state.posts.values().collect(),
        };

        let mut hits: Vec<(f64, &Post)> = candidates
            .into_iter()
            .map(|stored| (point.distance_m(&stored.post.location()), &stored.post))
            .filter(|(distance, _)| *distance <= radius_m)
            .collect();
        hits.sort_by(|(da, a), (db, b)| da.total_cmp(db).then(a.id.cmp(&b.id)));

        Ok(hits
            .into_iter()
            .take(clamp_limit(limit))
            .map(|(_, post)| PublicPost::from(post))
            .collect())
    }

    async fn update(&self, id: Uuid, device_id: &str, patch: &PostPatch) -> Result<Option<Post>> {
        let mut state = self.state.write().await;

        match state.posts.get_mut(&id) {
            Some(stored) if stored.post.owner_device_id == device_id => {
                patch.apply(&mut stored.post);
                Ok(Some(stored.post.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post(device: &str, lat: f64, lng: f64) -> NewPost {
        NewPost {
            owner_device_id: device.to_string(),
            location: GeoPoint::new(lat, lng).unwrap(),
            comment: None,
            image_url: "http://x/img.png".to_string(),
            user_center: None,
            natural_size: None,
            pixel_at_place: 8.0,
        }
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let repo = InMemoryPostRepository::new();
        let a = repo.insert(new_post("d1", 1.0, 1.0)).await.unwrap();
        let b = repo.insert(new_post("d2", 2.0, 2.0)).await.unwrap();
        let c = repo.insert(new_post("d1", 3.0, 3.0)).await.unwrap();

        let recent = repo.find_recent(2).await.unwrap();
        let ids: Vec<Uuid> = recent.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![c.id, b.id]);

        let all = repo.find_recent(10).await.unwrap();
        assert_eq!(all.last().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn owner_listing_filters_by_device() {
        let repo = InMemoryPostRepository::new();
        let first = repo.insert(new_post("d1", 1.0, 1.0)).await.unwrap();
        repo.insert(new_post("d2", 1.0, 1.0)).await.unwrap();
        let second = repo.insert(new_post("d1", 1.0, 1.0)).await.unwrap();

        let mine = repo.find_by_owner("d1", None).await.unwrap();
        assert_eq!(
            mine.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        let latest = repo.find_by_owner("d1", Some(1)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, second.id);

        assert!(repo.find_by_owner("nobody", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bounds_query_walks_grid_inclusively() {
        let repo = InMemoryPostRepository::with_cell_size(0.5);
        // Enough unrelated posts that the 3x3 cell walk beats a full scan
        for i in 0..12 {
            repo.insert(new_post("far", -30.0 - i as f64, 100.0)).await.unwrap();
        }
        let inside = repo.insert(new_post("d1", 40.2, -73.9)).await.unwrap();
        let edge = repo.insert(new_post("d1", 41.0, -73.0)).await.unwrap();
        repo.insert(new_post("d1", 39.5, -73.5)).await.unwrap();
        repo.insert(new_post("d1", 40.5, -72.0)).await.unwrap();

        let bbox = BoundingBox::new(-74.0, 40.0, -73.0, 41.0).unwrap();
        let found = repo.find_in_bounds(&bbox, 100).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![edge.id, inside.id]);
    }

    #[tokio::test]
    async fn world_sized_box_falls_back_to_scan() {
        let repo = InMemoryPostRepository::new();
        repo.insert(new_post("d1", -45.0, 170.0)).await.unwrap();
        repo.insert(new_post("d1", 60.0, -120.0)).await.unwrap();

        let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).unwrap();
        assert_eq!(repo.find_in_bounds(&bbox, 100).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn near_orders_by_distance_and_respects_radius() {
        let repo = InMemoryPostRepository::new();
        let center = GeoPoint::new(40.0, -73.0).unwrap();
        let far = repo.insert(new_post("d1", 40.02, -73.0)).await.unwrap();
        let close = repo.insert(new_post("d2", 40.001, -73.0)).await.unwrap();
        repo.insert(new_post("d3", 41.0, -73.0)).await.unwrap();

        let found = repo.find_near(&center, 5_000.0, 100).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![close.id, far.id]);

        let tight = repo.find_near(&center, 500.0, 100).await.unwrap();
        assert_eq!(tight.len(), 1);
        assert_eq!(tight[0].id, close.id);
    }

    #[tokio::test]
    async fn near_finds_points_at_the_radius_edge_across_cell_boundaries() {
        let repo = InMemoryPostRepository::new();
        // Enough unrelated posts that the grid walk beats a full scan
        for i in 0..40 {
            repo.insert(new_post("far", -30.0 - i as f64 * 0.5, 100.0))
                .await
                .unwrap();
        }

        // Due north, 4998 m away, just over the 41.0 cell boundary
        let center = GeoPoint::new(40.95506, -73.05).unwrap();
        let north = repo.insert(new_post("d1", 41.00001, -73.05)).await.unwrap();
        assert!(center.distance_m(&GeoPoint::new(41.00001, -73.05).unwrap()) < 5_000.0);

        let found = repo.find_near(&center, 5_000.0, 10).await.unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![north.id]);

        // Widest longitude of the cap sits slightly poleward of the centre
        let center = GeoPoint::new(60.0, 9.8405).unwrap();
        let east = GeoPoint::new(60.0005, 10.2001).unwrap();
        assert!(center.distance_m(&east) < 20_000.0);
        let east = repo.insert(new_post("d2", east.lat, east.lng)).await.unwrap();

        let found = repo.find_near(&center, 20_000.0, 10).await.unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![east.id]);
    }

    #[test]
    fn envelope_gives_up_when_the_cap_reaches_a_pole() {
        let near_pole = GeoPoint::new(89.9, 0.0).unwrap();
        assert!(radius_envelope(&near_pole, 50_000.0).is_none());

        let mid = GeoPoint::new(45.0, 0.0).unwrap();
        let envelope = radius_envelope(&mid, 1_000.0).unwrap();
        assert!(envelope.max_lat - 45.0 > 1_000.0 / 111_200.0);
        assert!(envelope.max_lon > envelope.max_lat - 45.0);
    }

    #[tokio::test]
    async fn near_across_antimeridian_uses_full_scan() {
        let repo = InMemoryPostRepository::new();
        let across = repo.insert(new_post("d1", 0.0, -179.99)).await.unwrap();

        let center = GeoPoint::new(0.0, 179.99).unwrap();
        let found = repo.find_near(&center, 5_000.0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, across.id);
    }

    #[tokio::test]
    async fn spatial_results_are_deterministic() {
        let repo = InMemoryPostRepository::new();
        for i in 0..20 {
            repo.insert(new_post("d1", 40.0 + (i % 4) as f64 * 0.001, -73.0))
                .await
                .unwrap();
        }
        let center = GeoPoint::new(40.0, -73.0).unwrap();

        let first = repo.find_near(&center, 2_000.0, 100).await.unwrap();
        let second = repo.find_near(&center, 2_000.0, 100).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
    }

    #[tokio::test]
    async fn update_is_conditional_on_owner() {
        let repo = InMemoryPostRepository::new();
        let post = repo.insert(new_post("d1", 1.0, 1.0)).await.unwrap();
        let patch = PostPatch {
            comment: Some("hack".to_string()),
            pixel_at_place: None,
        };

        assert!(repo.update(post.id, "d2", &patch).await.unwrap().is_none());
        assert!(repo
            .update(Uuid::new_v4(), "d1", &patch)
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.get_by_id(post.id).await.unwrap().unwrap(), post);

        let updated = repo.update(post.id, "d1", &patch).await.unwrap().unwrap();
        assert_eq!(updated.comment.as_deref(), Some("hack"));
        assert_eq!(updated.created_at, post.created_at);
    }
}
