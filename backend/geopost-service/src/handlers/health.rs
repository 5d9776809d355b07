/// Health endpoints: summary, readiness, liveness
use crate::services::{PostService, UploadGateway};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Serialize, Clone)]
#[serde(rename_all = "lowercase")]
enum ComponentStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    status: ComponentStatus,
    checks: HashMap<String, ComponentCheck>,
    timestamp: String,
}

fn component_check(
    name: &str,
    result: crate::error::Result<()>,
    started: Instant,
) -> (bool, ComponentCheck) {
    let latency_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => (
            true,
            ComponentCheck {
                status: ComponentStatus::Healthy,
                message: format!("{} reachable", name),
                latency_ms,
            },
        ),
        Err(e) => (
            false,
            ComponentCheck {
                status: ComponentStatus::Unhealthy,
                message: format!("{} check failed: {}", name, e),
                latency_ms,
            },
        ),
    }
}

/// Post store ping
pub async fn health_summary(posts: web::Data<PostService>) -> HttpResponse {
    match posts.health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "geopost-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": e.to_string(),
            "service": "geopost-service"
        })),
    }
}

/// Post store and object storage
pub async fn readiness_summary(
    posts: web::Data<PostService>,
    uploads: web::Data<UploadGateway>,
) -> HttpResponse {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let (store_ok, store_check) = component_check("post store", posts.health_check().await, started);
    checks.insert("post_store".to_string(), store_check);

    let started = Instant::now();
    let (objects_ok, objects_check) =
        component_check("object storage", uploads.health_check().await, started);
    checks.insert("object_storage".to_string(), objects_check);

    let ready = store_ok && objects_ok;
    let response = ReadinessResponse {
        ready,
        status: if ready {
            ComponentStatus::Healthy
        } else {
            ComponentStatus::Unhealthy
        },
        checks,
        timestamp: Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}
