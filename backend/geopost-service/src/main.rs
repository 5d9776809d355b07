use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig};
use geopost_service::config::{StorageBackend, StoreBackend};
use geopost_service::db::{self, InMemoryPostRepository, PgPostRepository, PostRepository};
use geopost_service::handlers;
use geopost_service::services::{PostService, PostSettings, UploadGateway};
use geopost_service::storage::{InMemoryObjectStore, ObjectStore, S3ObjectStore};
use s3_utils::S3Client;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Geopost Service
///
/// Map posts anchored to a coordinate and owned by a device identifier.
///
/// # Routes
///
/// - `/api/posts*` - Spatial listing, public feed, own post/history, create, update
/// - `/api/upload` - Multipart image upload
/// - `/uploads/{key}` - Uploaded objects when `STORAGE_BACKEND=memory`
/// - `/api/items*` - Aliases used by older map clients
/// - `/api/health*`, `/metrics` - Probes and Prometheus metrics
///
/// # Backends
///
/// `POST_STORE=postgres|memory` selects PostGIS or the in-process grid store;
/// `STORAGE_BACKEND=s3|memory` selects the object store for uploads.
#[actix_web::main]
async fn main() -> io::Result<()> {
    // Support container healthchecks via CLI subcommand: `healthcheck`
    {
        let mut args = std::env::args();
        let _bin = args.next();
        if let Some(cmd) = args.next() {
            if cmd == "healthcheck" || cmd == "healthcheck-http" {
                let port = std::env::var("GEOPOST_SERVICE_PORT").unwrap_or_else(|_| "8080".into());
                let url = format!("http://127.0.0.1:{}/api/health", port);
                match reqwest::Client::new().get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => return Ok(()),
                    Ok(resp) => {
                        eprintln!("healthcheck HTTP status: {}", resp.status());
                        return Err(io::Error::new(io::ErrorKind::Other, "healthcheck failed"));
                    }
                    Err(e) => {
                        eprintln!("healthcheck HTTP error: {}", e);
                        return Err(io::Error::new(io::ErrorKind::Other, "healthcheck error"));
                    }
                }
            }
        }
    }

    dotenvy::dotenv().ok();
    init_tracing();

    // Load configuration
    let config = match geopost_service::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting geopost-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let repo: Arc<dyn PostRepository> = match config.database.backend {
        StoreBackend::Postgres => {
            let mut db_cfg = DbPoolConfig::from_env("geopost-service", &config.database.url)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            if db_cfg.max_connections < config.database.max_connections {
                db_cfg.max_connections = config.database.max_connections;
            }

            db_cfg.log_config();
            let pool = match create_pg_pool(db_cfg).await {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::error!("Database pool creation failed: {:#}", e);
                    eprintln!("ERROR: Failed to create database pool: {}", e);
                    std::process::exit(1);
                }
            };

            if config.database.run_migrations {
                db::run_migrations(&pool).await.map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::Other,
                        format!("Failed to run migrations: {}", e),
                    )
                })?;
            }

            tracing::info!("Connected to database via db-pool crate");
            Arc::new(PgPostRepository::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory post store; posts are lost on restart");
            Arc::new(InMemoryPostRepository::new())
        }
    };

    let object_store: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::S3 => {
            let client = S3Client::connect(config.storage.s3.clone()).await;
            if let Err(e) = client.health_check().await {
                tracing::warn!("Object storage not reachable at startup: {}", e);
            }
            tracing::info!(bucket = %config.storage.s3.bucket, "S3 object store configured");
            Arc::new(S3ObjectStore::new(client))
        }
        StorageBackend::Memory => {
            let base_url = config
                .storage
                .s3
                .public_base_url
                .clone()
                .unwrap_or_else(|| {
                    format!(
                        "http://localhost:{}{}",
                        config.app.port,
                        handlers::UPLOADS_PATH
                    )
                });
            tracing::warn!("Using in-memory object store; uploads are lost on restart");
            Arc::new(InMemoryObjectStore::new(base_url))
        }
    };

    let post_service = web::Data::new(PostService::with_settings(
        repo,
        PostSettings::from(&config.posts),
    ));
    let upload_gateway = web::Data::new(UploadGateway::new(
        object_store,
        config.upload.max_bytes,
    ));
    let identity = web::Data::new(config.identity.clone());

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", bind_address);

    let allowed_origins = config.cors.allowed_origins.clone();
    let server = HttpServer::new(move || {
        // Build CORS configuration
        let mut cors = Cors::default();
        for origin in allowed_origins.split(',') {
            let origin = origin.trim();
            if origin.is_empty() {
                continue;
            }
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(post_service.clone())
            .app_data(upload_gateway.clone())
            .app_data(identity.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .route(
                "/metrics",
                web::get().to(geopost_service::metrics::serve_metrics),
            )
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run();

    let server_handle = server.handle();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            server_handle.stop(true).await;
        }
    }

    tracing::info!("Geopost-service shutting down");
    Ok(())
}
