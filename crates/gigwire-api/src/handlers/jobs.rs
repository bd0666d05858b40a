//! Job lifecycle handlers
//!
//! Thin adapters: parse and validate the request, call the service or
//! the escrow coordinator, map errors per the kind table.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use gigwire_types::{CreateJobInput, Job, JobId, JobStatus};

use crate::dto::{
    CancelRequest, ClaimRequest, CompleteRequest, CreateJobRequest, CreateJobResponse,
    DepositRequest, EscrowInstructions, HashCheckResponse, JobEnvelope, JobListQuery,
    JobListResponse, VerifyHashRequest, VerifyPaymentInfo, VerifyResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::ValidatedJson;
use crate::state::AppState;

/// Characters of the result exposed before payment
const PREVIEW_LEN: usize = 100;

/// sha256 hex digest of a result body
pub fn result_hash(result: &str) -> String {
    hex::encode(Sha256::digest(result.as_bytes()))
}

fn parse_id(id: &str) -> ApiResult<JobId> {
    JobId::parse(id).map_err(ApiError::from)
}

fn parse_status(raw: &str) -> ApiResult<JobStatus> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ApiError::Validation(format!("unknown status filter: {raw}")))
}

/// Create a job awaiting its escrow deposit
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "Jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created", body = CreateJobResponse),
        (status = 400, description = "Validation failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let job = state
        .jobs
        .create(CreateJobInput {
            title: body.title,
            description: body.description,
            bounty_usdc: body.bounty_usdc,
            requester_wallet: body.requester_wallet,
            tags: body.tags,
        })
        .await?;

    let settings = state.escrow.settings();
    let escrow = EscrowInstructions {
        deposit_to: settings.escrow_wallet.clone(),
        amount_atomic: job.bounty_atomic,
        instructions: format!(
            "Transfer {} atomic units of {} to {}, then POST /api/v1/jobs/{}/deposit with the transaction signature",
            job.bounty_atomic, settings.mint, settings.escrow_wallet, job.id
        ),
    };

    Ok((StatusCode::CREATED, Json(CreateJobResponse { job, escrow })))
}

/// Verify the escrow deposit and open the job
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/deposit",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Job opened", body = JobEnvelope),
        (status = 402, description = "Deposit rejected", body = crate::error::ErrorResponse)
    )
)]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<DepositRequest>,
) -> ApiResult<Json<JobEnvelope>> {
    let id = parse_id(&id)?;
    let job = state
        .escrow
        .activate_with_deposit(&id, &body.deposit_tx_sig)
        .await?;
    Ok(Json(JobEnvelope { job }))
}

/// Cancel an unclaimed job, refunding any held escrow
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Job cancelled", body = JobEnvelope),
        (status = 403, description = "Not the requester", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<CancelRequest>,
) -> ApiResult<Json<JobEnvelope>> {
    let id = parse_id(&id)?;
    let job = state
        .escrow
        .cancel_job(&id, &body.requester_wallet)
        .await?;
    Ok(Json(JobEnvelope { job }))
}

/// Claim an open job
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/claim",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Job claimed", body = JobEnvelope),
        (status = 400, description = "Not claimable", body = crate::error::ErrorResponse)
    )
)]
pub async fn claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<ClaimRequest>,
) -> ApiResult<Json<JobEnvelope>> {
    let id = parse_id(&id)?;
    let job = state.jobs.claim(&id, &body.worker_wallet).await?;
    Ok(Json(JobEnvelope { job }))
}

/// Deliver the result for a claimed job
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/complete",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Result stored", body = JobEnvelope),
        (status = 403, description = "Not the assigned worker", body = crate::error::ErrorResponse)
    )
)]
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<CompleteRequest>,
) -> ApiResult<Json<JobEnvelope>> {
    let id = parse_id(&id)?;
    let job = state
        .jobs
        .complete(&id, &body.worker_wallet, &body.result)
        .await?;
    Ok(Json(JobEnvelope { job }))
}

/// List jobs, optionally filtered by status
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "Jobs",
    params(("status" = Option<String>, Query, description = "Status filter")),
    responses((status = 200, description = "Jobs", body = JobListResponse))
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let jobs = state.jobs.list(status).await?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// List open jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs/open",
    tag = "Jobs",
    responses((status = 200, description = "Open jobs", body = JobListResponse))
)]
pub async fn open_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Json<JobListResponse>> {
    let jobs = state.jobs.list(Some(JobStatus::Open)).await?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// Fetch one job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job", body = JobEnvelope),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobEnvelope>> {
    let id = parse_id(&id)?;
    let job = state.jobs.get(&id).await?;
    Ok(Json(JobEnvelope { job }))
}

/// Pre-payment integrity surface: hash, length, preview.
///
/// Integrity only, not authenticity: the hash proves the paywalled body
/// is the stored result, not who produced it.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/verify",
    tag = "Verification",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Integrity digest", body = VerifyResponse),
        (status = 400, description = "No result yet", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<VerifyResponse>> {
    let id = parse_id(&id)?;
    let job = state.jobs.get(&id).await?;
    let result = require_result(&job)?;

    let preview: String = result.chars().take(PREVIEW_LEN).collect();
    Ok(Json(VerifyResponse {
        result_hash: result_hash(result),
        result_length: result.len(),
        preview,
        payment: VerifyPaymentInfo {
            bounty_usdc: job.bounty_usdc,
            payment_endpoint: format!("/api/v1/results/{}", job.id),
        },
    }))
}

/// Post-payment integrity check against a previously shared hash
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/verify-hash",
    tag = "Verification",
    params(("id" = String, Path, description = "Job id")),
    request_body = VerifyHashRequest,
    responses((status = 200, description = "Comparison", body = HashCheckResponse))
)]
pub async fn verify_hash(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<VerifyHashRequest>,
) -> ApiResult<Json<HashCheckResponse>> {
    let id = parse_id(&id)?;
    let job = state.jobs.get(&id).await?;
    let result = require_result(&job)?;

    Ok(Json(HashCheckResponse {
        hash_matches: result_hash(result).eq_ignore_ascii_case(&body.expected_hash),
    }))
}

/// Activate a job without on-chain verification. Demo deployments only;
/// the route is not mounted otherwise.
pub async fn activate_demo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobEnvelope>> {
    let id = parse_id(&id)?;
    tracing::warn!(job_id = %id, "demo activation without on-chain verification");
    let job = state.jobs.activate(&id, "demo_activation").await?;
    Ok(Json(JobEnvelope { job }))
}

fn require_result(job: &Job) -> ApiResult<&String> {
    job.result.as_ref().ok_or_else(|| {
        ApiError::StateError(format!(
            "Cannot verify job {} in status {}",
            job.id, job.status
        ))
    })
}
