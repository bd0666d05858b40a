//! Result retrieval behind the x402 paywall
//!
//! A COMPLETED job's result is released either by the pre-funded escrow
//! (detected and settled inline) or by a payment presented in the
//! `X-Payment` header. Both paths converge on the same COMPLETED -> PAID
//! transition; the loser of a race observes an idempotent success.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use gigwire_types::{GigwireError, Job, JobStatus};

use crate::dto::{PaymentPointer, ResultResponse};
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;
use crate::x402::{
    decode_header, decode_transaction, encode_header, PaymentPayload, PaymentReceipt,
    PaymentRequirements, PAYMENT_HEADER, PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER,
};

/// Retrieve a job result, settling payment on the way.
///
/// Responses: 200 with the result once settled, 402 with an
/// `X-Payment-Required` challenge while payment is outstanding, 410 for
/// jobs that will never produce a result.
#[utoipa::path(
    get,
    path = "/api/v1/results/{jobId}",
    tag = "Results",
    params(("jobId" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Result", body = ResultResponse),
        (status = 402, description = "Payment required", body = crate::error::ErrorResponse),
        (status = 410, description = "Result will never exist", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let id = match gigwire_types::JobId::parse(&job_id) {
        Ok(id) => id,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let job = match state.jobs.get(&id).await {
        Ok(job) => job,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match job.status {
        JobStatus::PendingDeposit | JobStatus::Open | JobStatus::Claimed => {
            ApiError::StateError(format!(
                "Cannot retrieve result for job {} in status {}",
                job.id, job.status
            ))
            .into_response()
        }
        JobStatus::Cancelled | JobStatus::Expired => ApiError::Gone(format!(
            "Job {} is {} and has no result",
            job.id, job.status
        ))
        .into_response(),
        JobStatus::Paid => paid_response(&job, None),
        JobStatus::Completed => settle(state, job, &headers).await,
    }
}

/// Settle a COMPLETED job: escrow release when a deposit is held,
/// otherwise the paywall.
async fn settle(state: Arc<AppState>, job: Job, headers: &HeaderMap) -> Response {
    let challenge = challenge_for(&state, &job);

    if state.escrow.ledger().is_held(&job.id).await {
        return match state.escrow.release_to_worker(&job.id).await {
            Ok(paid) => {
                let receipt = PaymentReceipt {
                    tx_sig: paid.payment_tx_sig.clone().unwrap_or_default(),
                    success: true,
                    breakdown: challenge.breakdown.clone(),
                };
                paid_response(&paid, Some(receipt))
            }
            Err(e) => ApiError::from(e).into_response(),
        };
    }

    match headers.get(PAYMENT_HEADER) {
        Some(raw) => accept_payment(state, job, raw, challenge).await,
        None => challenge_response(&challenge),
    }
}

/// Submit the presented transaction and verify the worker was paid.
///
/// Verification failures re-issue the same 402 challenge so the client
/// can retry; only backend faults surface as 502.
async fn accept_payment(
    state: Arc<AppState>,
    job: Job,
    raw_header: &HeaderValue,
    challenge: PaymentRequirements,
) -> Response {
    let worker = job.worker_wallet.clone().unwrap_or_default();
    let settings = state.escrow.settings();
    let fee = settings.fee_for(job.bounty_atomic);
    let required = (job.bounty_atomic - fee) as i128;

    let outcome: Result<Response, GigwireError> = async {
        let raw = raw_header
            .to_str()
            .map_err(|_| GigwireError::payment_invalid("malformed payment header encoding"))?;
        let payload: PaymentPayload = decode_header(raw)?;
        let tx_bytes = decode_transaction(&payload)?;

        let tx_sig = state.chain.submit_raw(&tx_bytes).await?;
        state.chain.confirm(&tx_sig).await?;
        let transfer = state.chain.get_confirmed(&tx_sig).await?;

        let received = transfer.received_by(&worker, &settings.mint);
        if received < required {
            return Err(GigwireError::payment_invalid(
                "payment does not cover the required amount to the worker",
            ));
        }

        // Idempotent: a concurrent duplicate observes the winner's signature
        let paid = state.jobs.mark_paid(&job.id, &tx_sig).await?;
        let receipt = PaymentReceipt {
            tx_sig: paid.payment_tx_sig.clone().unwrap_or(tx_sig),
            success: true,
            breakdown: challenge.breakdown.clone(),
        };
        Ok(paid_response(&paid, Some(receipt)))
    }
    .await;

    match outcome {
        Ok(response) => response,
        Err(e) if e.kind() == "payment_invalid" => {
            tracing::debug!(job_id = %job.id, error = %e, "payment rejected, re-challenging");
            challenge_response(&challenge)
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn challenge_for(state: &AppState, job: &Job) -> PaymentRequirements {
    let settings = state.escrow.settings();
    PaymentRequirements::for_job(
        job,
        &state.paywall.network,
        &settings.mint,
        settings.platform_wallet.as_deref(),
        settings.fee_for(job.bounty_atomic),
    )
}

/// 402 with the machine-readable challenge header
fn challenge_response(challenge: &PaymentRequirements) -> Response {
    let mut response = (
        StatusCode::PAYMENT_REQUIRED,
        Json(ErrorResponse {
            error: "payment_required".to_string(),
            message: "payment required to retrieve this result".to_string(),
        }),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&encode_header(challenge)) {
        response
            .headers_mut()
            .insert(PAYMENT_REQUIRED_HEADER, value);
    }
    response
}

/// 200 with the result body, attaching the settlement receipt header
/// when this request performed the settlement
fn paid_response(job: &Job, receipt: Option<PaymentReceipt>) -> Response {
    let body = ResultResponse {
        result: job.result.clone().unwrap_or_default(),
        payment: PaymentPointer {
            tx_sig: job.payment_tx_sig.clone().unwrap_or_default(),
        },
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Some(receipt) = receipt {
        if let Ok(value) = HeaderValue::from_str(&encode_header(&receipt)) {
            response
                .headers_mut()
                .insert(PAYMENT_RESPONSE_HEADER, value);
        }
    }
    response
}
