/// HTTP middleware utilities for geopost-service
///
/// Device identity extraction (cookie first, then header) and per-request
/// Prometheus metrics.
use crate::config::IdentityConfig;
use crate::error::AppError;
use crate::metrics::collectors::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use std::fmt;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::{Duration, Instant};

// =====================================================================
// Device identity
// =====================================================================

/// Opaque client-chosen identifier that owns posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(pub String);

impl DeviceId {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(DeviceId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn with_identity_config<T>(req: &HttpRequest, f: impl FnOnce(&IdentityConfig) -> T) -> T {
    match req.app_data::<web::Data<IdentityConfig>>() {
        Some(config) => f(config.get_ref()),
        None => f(&IdentityConfig::default()),
    }
}

fn cookie_device_id(req: &HttpRequest, config: &IdentityConfig) -> Option<DeviceId> {
    req.cookie(&config.cookie_name)
        .and_then(|cookie| DeviceId::parse(cookie.value()))
}

/// Device identifier from the identity header only.
pub fn header_device_id(req: &HttpRequest, config: &IdentityConfig) -> Option<DeviceId> {
    req.headers()
        .get(config.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .and_then(DeviceId::parse)
}

/// Cookie wins over header; blank values count as absent.
pub fn resolve_device_id(req: &HttpRequest, config: &IdentityConfig) -> Option<DeviceId> {
    cookie_device_id(req, config).or_else(|| header_device_id(req, config))
}

/// Optional caller identity. Endpoints that need one decide how to fail.
#[derive(Debug, Clone)]
pub struct MaybeDeviceId(pub Option<DeviceId>);

impl MaybeDeviceId {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_ref().map(DeviceId::as_str)
    }
}

impl FromRequest for MaybeDeviceId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(Ok(MaybeDeviceId(with_identity_config(req, |config| {
            resolve_device_id(req, config)
        }))))
    }
}

/// Identity taken strictly from the header; missing is a 400.
#[derive(Debug, Clone)]
pub struct HeaderDeviceId(pub DeviceId);

impl FromRequest for HeaderDeviceId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            with_identity_config(req, |config| header_device_id(req, config))
                .map(HeaderDeviceId)
                .ok_or_else(|| {
                    AppError::Validation("Device ID header is missing".to_string()).into()
                }),
        )
    }
}

// =====================================================================
// Metrics middleware
// =====================================================================

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let res = service.call(req).await;
            let elapsed = start.elapsed();
            let (route, status) = match &res {
                Ok(r) => (route_label(r.request()), r.status().as_u16()),
                Err(e) => (
                    UNMATCHED_ROUTE.to_string(),
                    e.as_response_error().status_code().as_u16(),
                ),
            };
            observe_request(&method, &route, status, elapsed);
            tracing::debug!(
                %method,
                %route,
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                "request completed"
            );
            res
        })
    }
}

const UNMATCHED_ROUTE: &str = "unmatched";

/// Route pattern (`/api/posts/{x}` style) so label cardinality stays bounded
fn route_label(req: &HttpRequest) -> String {
    req.match_pattern()
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

fn observe_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route, &status])
        .observe(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn requests_are_counted_by_route_pattern() {
        use actix_web::{test, web, App, HttpResponse};

        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(MetricsMiddleware)
                    .route(
                        "/things/{id}",
                        web::get().to(|| async { HttpResponse::Ok().finish() }),
                    ),
            ),
        )
        .await;

        let labels = ["GET", "/api/things/{id}", "200"];
        let before = HTTP_REQUESTS_TOTAL.with_label_values(&labels).get();
        let observed = HTTP_REQUEST_DURATION_SECONDS
            .with_label_values(&labels)
            .get_sample_count();

        for id in ["a", "b"] {
            let req = test::TestRequest::get()
                .uri(&format!("/api/things/{}", id))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }

        assert_eq!(HTTP_REQUESTS_TOTAL.with_label_values(&labels).get(), before + 2);
        assert_eq!(
            HTTP_REQUEST_DURATION_SECONDS
                .with_label_values(&labels)
                .get_sample_count(),
            observed + 2
        );
    }

    #[test]
    fn cookie_takes_precedence_over_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new("deviceId", "dev-cookie"))
            .insert_header(("x-device-id", "dev-header"))
            .to_http_request();

        let resolved = resolve_device_id(&req, &IdentityConfig::default());
        assert_eq!(resolved, Some(DeviceId("dev-cookie".to_string())));
    }

    #[test]
    fn header_is_used_without_cookie() {
        let req = TestRequest::default()
            .insert_header(("x-device-id", "dev-header"))
            .to_http_request();

        let resolved = resolve_device_id(&req, &IdentityConfig::default());
        assert_eq!(resolved, Some(DeviceId("dev-header".to_string())));
    }

    #[test]
    fn blank_values_are_absent() {
        let req = TestRequest::default()
            .cookie(Cookie::new("deviceId", "  "))
            .insert_header(("x-device-id", ""))
            .to_http_request();

        assert_eq!(resolve_device_id(&req, &IdentityConfig::default()), None);
    }

    #[test]
    fn blank_cookie_falls_through_to_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new("deviceId", ""))
            .insert_header(("x-device-id", "dev-header"))
            .to_http_request();

        let resolved = resolve_device_id(&req, &IdentityConfig::default());
        assert_eq!(resolved, Some(DeviceId("dev-header".to_string())));
    }

    #[test]
    fn header_lookup_ignores_cookie() {
        let req = TestRequest::default()
            .cookie(Cookie::new("deviceId", "dev-cookie"))
            .to_http_request();

        assert_eq!(header_device_id(&req, &IdentityConfig::default()), None);
    }

    #[actix_web::test]
    async fn extractors_honour_configured_names() {
        let config = IdentityConfig {
            cookie_name: "did".to_string(),
            header_name: "x-client".to_string(),
        };
        let req = TestRequest::default()
            .app_data(web::Data::new(config))
            .cookie(Cookie::new("deviceId", "ignored"))
            .insert_header(("x-client", "dev-7"))
            .to_http_request();

        let maybe = MaybeDeviceId::extract(&req).await.unwrap();
        assert_eq!(maybe.as_deref(), Some("dev-7"));

        let header = HeaderDeviceId::extract(&req).await.unwrap();
        assert_eq!(header.0.as_str(), "dev-7");
    }

    #[actix_web::test]
    async fn missing_header_is_bad_request() {
        let req = TestRequest::default().to_http_request();
        let err = HeaderDeviceId::extract(&req).await.unwrap_err();
        assert_eq!(
            err.as_response_error().status_code(),
            actix_web::http::StatusCode::BAD_REQUEST
        );
    }
}
