//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Create API v1 routes
pub fn api_v1_routes(demo_mode: bool) -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route("/ping", get(handlers::health::ping))
        // Job lifecycle
        .route(
            "/jobs",
            post(handlers::jobs::create_job).get(handlers::jobs::list_jobs),
        )
        .route("/jobs/open", get(handlers::jobs::open_jobs))
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .route("/jobs/{id}/deposit", post(handlers::jobs::deposit))
        .route("/jobs/{id}/cancel", post(handlers::jobs::cancel))
        .route("/jobs/{id}/claim", post(handlers::jobs::claim))
        .route("/jobs/{id}/complete", post(handlers::jobs::complete))
        // Result integrity
        .route("/jobs/{id}/verify", get(handlers::jobs::verify_result))
        .route("/jobs/{id}/verify-hash", post(handlers::jobs::verify_hash))
        // Paywalled results
        .route("/results/{job_id}", get(handlers::results::get_result));

    if demo_mode {
        router = router.route(
            "/jobs/{id}/activate-demo",
            post(handlers::jobs::activate_demo),
        );
    }

    router
}

/// Create Swagger UI routes
pub fn swagger_routes() -> Router<Arc<AppState>> {
    use crate::openapi::ApiDoc;
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
