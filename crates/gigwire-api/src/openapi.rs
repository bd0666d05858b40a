//! OpenAPI documentation
//!
//! Auto-generated OpenAPI 3.0 specification for the Gigwire API.

use utoipa::OpenApi;

use crate::dto;
use crate::error::ErrorResponse;
use crate::handlers;
use crate::x402;

/// Gigwire API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gigwire API",
        description = "Bot-to-bot job marketplace: USDC-bountied jobs with escrow or x402 paywall settlement.",
        version = "0.1.0",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development")
    ),
    paths(
        handlers::health::health_check,
        handlers::health::ping,
        handlers::jobs::create_job,
        handlers::jobs::deposit,
        handlers::jobs::cancel,
        handlers::jobs::claim,
        handlers::jobs::complete,
        handlers::jobs::list_jobs,
        handlers::jobs::open_jobs,
        handlers::jobs::get_job,
        handlers::jobs::verify_result,
        handlers::jobs::verify_hash,
        handlers::results::get_result,
    ),
    components(schemas(
        ErrorResponse,
        dto::CreateJobRequest,
        dto::CreateJobResponse,
        dto::DepositRequest,
        dto::CancelRequest,
        dto::ClaimRequest,
        dto::CompleteRequest,
        dto::VerifyHashRequest,
        dto::EscrowInstructions,
        dto::JobEnvelope,
        dto::JobListResponse,
        dto::VerifyResponse,
        dto::HashCheckResponse,
        dto::ResultResponse,
        x402::PaymentRequirements,
        x402::PaymentPayload,
        x402::PaymentReceipt,
    )),
    tags(
        (name = "Jobs", description = "Job lifecycle"),
        (name = "Results", description = "Paywalled result retrieval"),
        (name = "Verification", description = "Result integrity"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builds() {
        let spec = ApiDoc::openapi();
        let json = spec.to_json().unwrap();
        assert!(json.contains("/api/v1/jobs"));
        assert!(json.contains("/api/v1/results/{jobId}"));
    }
}
