/// HTTP handlers for geopost endpoints
///
/// - Posts: spatial listing, public feed, own post/history, create, update
/// - Uploads: multipart image upload to object storage
/// - Health: summary, readiness and liveness probes
///
/// The `/api/items` routes are aliases kept for older map clients.
pub mod health;
pub mod posts;
pub mod uploads;

pub use health::{health_summary, liveness_check, readiness_summary};
pub use posts::{
    create_post, get_own_post, get_post_history, list_posts, list_posts_in_bounds,
    list_public_posts, update_post,
};
pub use uploads::{serve_upload, upload_file};

use crate::error::AppError;
use crate::middleware::MetricsMiddleware;
use actix_web::web;

/// Malformed JSON bodies are client errors
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid request body: {}", err)).into()
    })
}

/// Malformed query strings are client errors
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid query string: {}", err)).into()
    })
}

/// Path prefix under which the in-process object store is served
pub const UPLOADS_PATH: &str = "/uploads";

/// Register the `/api` route table plus `/uploads/{key}`. Services (`PostService`,
/// `UploadGateway`, `IdentityConfig`) are expected as app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health_summary))
        .route("/api/health/ready", web::get().to(readiness_summary))
        .route("/api/health/live", web::get().to(liveness_check))
        .route(
            &format!("{}/{{key}}", UPLOADS_PATH),
            web::get().to(serve_upload),
        )
        .service(
            web::scope("/api")
                .app_data(json_config())
                .app_data(query_config())
                .wrap(MetricsMiddleware)
                .service(
                    web::scope("/posts")
                        .service(
                            web::resource("")
                                .route(web::get().to(list_posts))
                                .route(web::post().to(create_post))
                                .route(web::patch().to(update_post)),
                        )
                        .route("/public", web::get().to(list_public_posts))
                        .route("/mine", web::get().to(get_own_post))
                        .route("/history", web::get().to(get_post_history)),
                )
                .service(
                    web::scope("/items")
                        .service(
                            web::resource("")
                                .route(web::get().to(list_posts))
                                .route(web::post().to(create_post))
                                .route(web::patch().to(update_post)),
                        )
                        .route("/near", web::get().to(list_posts_in_bounds))
                        .route("/me", web::get().to(get_own_post))
                        .route("/history", web::get().to(get_post_history)),
                )
                .route("/upload", web::post().to(upload_file)),
        );
}
