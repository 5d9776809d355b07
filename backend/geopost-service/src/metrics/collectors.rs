use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Histogram, HistogramVec, IntCounter, IntCounterVec,
};

lazy_static! {
    /// API requests by method, matched route pattern and status.
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "geopost_http_requests_total",
        "Total API requests",
        &["method", "route", "status"]
    )
    .expect("failed to register geopost_http_requests_total");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "geopost_http_request_duration_seconds",
        "API request latency in seconds",
        &["method", "route", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("failed to register geopost_http_request_duration_seconds");

    /// Posts successfully persisted.
    pub static ref POSTS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "geopost_posts_created_total",
        "Total posts created"
    )
    .expect("failed to register geopost_posts_created_total");

    /// Update attempts by outcome (updated/rejected).
    pub static ref POST_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "geopost_post_updates_total",
        "Post update attempts segmented by outcome",
        &["result"]
    )
    .expect("failed to register geopost_post_updates_total");

    /// Spatial reads by query kind (near/bounds).
    pub static ref SPATIAL_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "geopost_spatial_queries_total",
        "Spatial post queries segmented by kind",
        &["kind"]
    )
    .expect("failed to register geopost_spatial_queries_total");

    /// Upload attempts by outcome (stored/rejected/failed).
    pub static ref UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "geopost_uploads_total",
        "Upload attempts segmented by outcome",
        &["result"]
    )
    .expect("failed to register geopost_uploads_total");

    pub static ref UPLOAD_BYTES: Histogram = register_histogram!(
        "geopost_upload_bytes",
        "Size of stored uploads in bytes",
        vec![1024.0, 16384.0, 131072.0, 524288.0, 1048576.0, 4194304.0, 10485760.0]
    )
    .expect("failed to register geopost_upload_bytes");
}
