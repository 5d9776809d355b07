/// Geopost Service Library
///
/// Map-anchored image posts owned by an opaque device identifier: spatial
/// listing, public feed, ownership-checked edits and image upload.
///
/// # Modules
///
/// - `handlers`: HTTP request handlers and the route table
/// - `models`: Posts, public projection, geometry and request/response DTOs
/// - `services`: Post service and upload gateway
/// - `db`: `PostRepository` trait with PostGIS and in-memory implementations
/// - `storage`: Object storage for uploaded images
/// - `middleware`: Device identity extraction and request metrics
/// - `error`: Error types and handling
/// - `config`: Configuration management
/// - `metrics`: Prometheus collectors
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::{AppError, Result};
