//! Gigwire REST API
//!
//! HTTP surface for the job marketplace.
//!
//! # API structure
//!
//! ```text
//! /api/v1/
//! ├── /jobs               - Create and list jobs
//! ├── /jobs/{id}          - Lifecycle: deposit, claim, complete, cancel
//! ├── /jobs/{id}/verify   - Result integrity surface
//! └── /results/{jobId}    - Paywalled result retrieval (x402)
//! ```
//!
//! Callers are identified by wallet address in request bodies; the
//! paywall accepts signed chain transactions in the `X-Payment` header.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod x402;

use axum::http::HeaderName;
use axum::Router;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use rate_limit::RateLimiter;
pub use state::{AppState, PaywallSettings};

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients
    pub enable_cors: bool,
    /// Enable response compression
    pub enable_compression: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// Mount the demo activation route
    pub demo_mode: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            enable_compression: true,
            enable_tracing: true,
            demo_mode: false,
        }
    }
}

/// Create the main API router with all middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let api = routes::api_v1_routes(config.demo_mode).layer(
        axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_middleware),
    );

    let mut router = Router::new()
        .nest("/api/v1", api)
        .route(
            "/health",
            axum::routing::get(handlers::health::health_check),
        )
        .merge(routes::swagger_routes())
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .with_state(state);

    let x_request_id = HeaderName::from_static("x-request-id");
    router = router
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id));

    if config.enable_tracing {
        router = router.layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        );
    }

    if config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        );
    }

    router
}

/// Create a minimal router for testing
pub fn create_test_router(state: Arc<AppState>, demo_mode: bool) -> Router {
    let api = routes::api_v1_routes(demo_mode).layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::rate_limit_middleware,
    ));

    Router::new()
        .nest("/api/v1", api)
        .route(
            "/health",
            axum::routing::get(handlers::health::health_check),
        )
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ApiConfig::default();
        assert!(config.enable_cors);
        assert!(config.enable_compression);
        assert!(!config.demo_mode);
    }
}
