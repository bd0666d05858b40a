//! Request and response DTOs
//!
//! Requests carry `validator` rules; responses wrap domain types. All
//! JSON is camelCase.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use gigwire_types::{is_valid_wallet, Job};

/// POST /jobs body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 200, message = "title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(
        min = 1,
        max = 5000,
        message = "description must be between 1 and 5000 characters"
    ))]
    pub description: String,
    /// Display units; converted to atomic units exactly once
    pub bounty_usdc: f64,
    #[validate(custom(function = "wallet_syntax"))]
    pub requester_wallet: String,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 tags"))]
    pub tags: Vec<String>,
}

/// POST /jobs/{id}/deposit body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    #[validate(length(min = 1, max = 128, message = "depositTxSig is required"))]
    pub deposit_tx_sig: String,
}

/// POST /jobs/{id}/cancel body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[validate(custom(function = "wallet_syntax"))]
    pub requester_wallet: String,
}

/// POST /jobs/{id}/claim body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[validate(custom(function = "wallet_syntax"))]
    pub worker_wallet: String,
}

/// POST /jobs/{id}/complete body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[validate(length(
        min = 1,
        max = 100000,
        message = "result must be between 1 and 100000 characters"
    ))]
    pub result: String,
    #[validate(custom(function = "wallet_syntax"))]
    pub worker_wallet: String,
}

/// POST /jobs/{id}/verify-hash body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyHashRequest {
    #[validate(length(equal = 64, message = "expectedHash must be a sha256 hex digest"))]
    pub expected_hash: String,
}

/// Job list query
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct JobListQuery {
    /// Optional status filter (e.g. `OPEN`)
    pub status: Option<String>,
}

/// Funding instructions returned at creation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EscrowInstructions {
    /// Escrow wallet to fund
    pub deposit_to: String,
    pub amount_atomic: u64,
    /// Human-readable funding steps
    pub instructions: String,
}

/// 201 response for job creation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateJobResponse {
    #[schema(value_type = Object)]
    pub job: Job,
    pub escrow: EscrowInstructions,
}

/// Single-job envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobEnvelope {
    #[schema(value_type = Object)]
    pub job: Job,
}

/// Job listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobListResponse {
    #[schema(value_type = Vec<Object>)]
    pub jobs: Vec<Job>,
    pub count: usize,
}

/// Payment pointer inside the verify surface
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentInfo {
    pub bounty_usdc: f64,
    pub payment_endpoint: String,
}

/// GET /jobs/{id}/verify response: pre-payment integrity check
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// sha256 hex of the full stored result
    pub result_hash: String,
    pub result_length: usize,
    /// Leading slice of the result
    pub preview: String,
    pub payment: VerifyPaymentInfo,
}

/// POST /jobs/{id}/verify-hash response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HashCheckResponse {
    pub hash_matches: bool,
}

/// Settlement pointer returned with a paid result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPointer {
    pub tx_sig: String,
}

/// GET /results/{jobId} success body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub result: String,
    pub payment: PaymentPointer,
}

fn wallet_syntax(wallet: &str) -> Result<(), ValidationError> {
    if is_valid_wallet(wallet) {
        Ok(())
    } else {
        Err(ValidationError::new("wallet").with_message("malformed wallet address".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_validates() {
        let ok = CreateJobRequest {
            title: "t".to_string(),
            description: "d".to_string(),
            bounty_usdc: 1.0,
            requester_wallet: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            tags: vec![],
        };
        assert!(ok.validate().is_ok());

        let bad_wallet = CreateJobRequest {
            requester_wallet: "not-a-wallet".to_string(),
            ..ok.clone()
        };
        assert!(bad_wallet.validate().is_err());

        let bad_title = CreateJobRequest {
            title: "x".repeat(201),
            ..ok
        };
        assert!(bad_title.validate().is_err());
    }

    #[test]
    fn camel_case_wire_format() {
        let body: CreateJobRequest = serde_json::from_value(serde_json::json!({
            "title": "t",
            "description": "d",
            "bountyUsdc": 0.5,
            "requesterWallet": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"
        }))
        .unwrap();
        assert_eq!(body.bounty_usdc, 0.5);
        assert!(body.tags.is_empty());
    }
}
