/// Configuration management for the geopost service
///
/// All settings come from environment variables (a `.env` file is loaded by
/// the binary before this runs). Missing values fall back to defaults;
/// values that are present but unparseable are rejected.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub posts: PostsConfig,
    pub identity: IdentityConfig,
    pub upload: UploadConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown post store '{}'", other)),
        }
    }
}

/// Post store configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3: s3_utils::S3Config,
}

/// Post query tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsConfig {
    /// Size and hard cap of the public listing
    pub public_limit: i64,
    /// Radius used by proximity queries that do not pass one
    pub nearby_radius_m: f64,
    /// Upper bound on rows returned by a spatial query
    pub max_spatial_results: i64,
    pub default_pixel_at_place: f64,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            public_limit: 50,
            nearby_radius_m: 5_000.0,
            max_spatial_results: 500,
            default_pixel_at_place: 8.0,
        }
    }
}

/// Where the device identifier is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub cookie_name: String,
    pub header_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: "deviceId".to_string(),
            header_name: "x-device-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        let posts_defaults = PostsConfig::default();
        let identity_defaults = IdentityConfig::default();
        let upload_defaults = UploadConfig::default();

        let config = Config {
            app: AppConfig {
                env: app_env,
                host: std::env::var("GEOPOST_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or_default("GEOPOST_SERVICE_PORT", 8080)?,
            },
            cors: {
                let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(value) => value,
                    Err(_) if production => {
                        return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
                    }
                    Err(_) => "http://localhost:5173".to_string(),
                };

                if production && allowed_origins.trim() == "*" {
                    return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
                }

                CorsConfig { allowed_origins }
            },
            database: DatabaseConfig {
                backend: parse_env_or_default("POST_STORE", StoreBackend::Postgres)?,
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/geopost".to_string()),
                max_connections: parse_env_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
                run_migrations: parse_env_or_default("RUN_MIGRATIONS", true)?,
            },
            storage: StorageConfig {
                backend: parse_env_or_default("STORAGE_BACKEND", StorageBackend::S3)?,
                s3: s3_utils::S3Config {
                    bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "posts".to_string()),
                    region: std::env::var("AWS_REGION")
                        .unwrap_or_else(|_| "us-east-1".to_string()),
                    endpoint: non_empty_env("S3_ENDPOINT"),
                    public_base_url: non_empty_env("S3_PUBLIC_BASE_URL"),
                    access_key_id: non_empty_env("S3_ACCESS_KEY_ID"),
                    secret_access_key: non_empty_env("S3_SECRET_ACCESS_KEY"),
                    path_style: parse_env_or_default("S3_PATH_STYLE", false)?,
                },
            },
            posts: PostsConfig {
                public_limit: parse_env_or_default("POSTS_PUBLIC_LIMIT", posts_defaults.public_limit)?,
                nearby_radius_m: parse_env_or_default(
                    "POSTS_NEARBY_RADIUS_M",
                    posts_defaults.nearby_radius_m,
                )?,
                max_spatial_results: parse_env_or_default(
                    "POSTS_MAX_SPATIAL_RESULTS",
                    posts_defaults.max_spatial_results,
                )?,
                default_pixel_at_place: parse_env_or_default(
                    "POSTS_DEFAULT_PIXEL_AT_PLACE",
                    posts_defaults.default_pixel_at_place,
                )?,
            },
            identity: IdentityConfig {
                cookie_name: std::env::var("DEVICE_ID_COOKIE")
                    .unwrap_or(identity_defaults.cookie_name),
                header_name: std::env::var("DEVICE_ID_HEADER")
                    .unwrap_or(identity_defaults.header_name),
            },
            upload: UploadConfig {
                max_bytes: parse_env_or_default("UPLOAD_MAX_BYTES", upload_defaults.max_bytes)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.posts.public_limit <= 0 {
            return Err("POSTS_PUBLIC_LIMIT must be positive".to_string());
        }
        if self.posts.max_spatial_results <= 0 {
            return Err("POSTS_MAX_SPATIAL_RESULTS must be positive".to_string());
        }
        if !(self.posts.nearby_radius_m.is_finite() && self.posts.nearby_radius_m > 0.0) {
            return Err("POSTS_NEARBY_RADIUS_M must be a positive number".to_string());
        }
        if !self.posts.default_pixel_at_place.is_finite() {
            return Err("POSTS_DEFAULT_PIXEL_AT_PLACE must be finite".to_string());
        }
        if self.upload.max_bytes == 0 {
            return Err("UPLOAD_MAX_BYTES must be positive".to_string());
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse {}='{}': {}", key, val, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &[&str] = &[
        "APP_ENV",
        "CORS_ALLOWED_ORIGINS",
        "GEOPOST_SERVICE_PORT",
        "POST_STORE",
        "STORAGE_BACKEND",
        "POSTS_PUBLIC_LIMIT",
        "POSTS_NEARBY_RADIUS_M",
        "UPLOAD_MAX_BYTES",
        "DEVICE_ID_COOKIE",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial_test::serial]
    fn defaults_without_env() {
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.port, 8080);
        assert_eq!(config.database.backend, StoreBackend::Postgres);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.s3.bucket, "posts");
        assert_eq!(config.posts.public_limit, 50);
        assert_eq!(config.posts.default_pixel_at_place, 8.0);
        assert_eq!(config.identity.cookie_name, "deviceId");
        assert_eq!(config.identity.header_name, "x-device-id");
    }

    #[test]
    #[serial_test::serial]
    fn memory_backends_from_env() {
        clear_env();
        std::env::set_var("POST_STORE", "memory");
        std::env::set_var("STORAGE_BACKEND", "Memory");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.storage.backend, StorageBackend::Memory);

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn malformed_number_is_an_error() {
        clear_env();
        std::env::set_var("POSTS_NEARBY_RADIUS_M", "far");

        let err = Config::from_env().unwrap_err();
        assert!(err.contains("POSTS_NEARBY_RADIUS_M"));

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn production_requires_cors_origins() {
        clear_env();
        std::env::set_var("APP_ENV", "production");
        assert!(Config::from_env().is_err());

        std::env::set_var("CORS_ALLOWED_ORIGINS", "*");
        assert!(Config::from_env().is_err());

        std::env::set_var("CORS_ALLOWED_ORIGINS", "https://map.example.com");
        assert!(Config::from_env().is_ok());

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn zero_public_limit_rejected() {
        clear_env();
        std::env::set_var("POSTS_PUBLIC_LIMIT", "0");
        assert!(Config::from_env().is_err());
        clear_env();
    }
}
