//! x402 payment header codec
//!
//! The 402 challenge and its replies travel as base64-encoded JSON in
//! three headers: the server's `X-Payment-Required` challenge, the
//! client's `X-Payment` submission, and the server's
//! `X-Payment-Response` receipt.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;

use gigwire_types::{atomic_to_usdc, GigwireError, Job, Result};

pub const PAYMENT_REQUIRED_HEADER: &str = "X-Payment-Required";
pub const PAYMENT_HEADER: &str = "X-Payment";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";

/// One acceptable payment scheme in a 402 challenge
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAccept {
    /// Always `exact` — pay the stated amount, no more negotiation
    pub scheme: String,
    pub network: String,
    /// Atomic units, stringified
    pub max_amount_required: String,
    /// Asset mint address
    pub asset: String,
    /// Recipient wallet (the worker)
    pub pay_to: String,
}

/// Worker or platform leg of the split
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentParty {
    pub address: String,
    /// Atomic units, stringified
    pub amount: String,
}

/// Fee leg with its percentage
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformParty {
    pub address: String,
    pub amount: String,
    pub percent: f64,
}

/// Worker/platform split advertised alongside the challenge
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBreakdown {
    /// Total atomic units
    pub total: String,
    pub worker: PaymentParty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformParty>,
}

/// `X-Payment-Required` payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub accepts: Vec<PaymentAccept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<PaymentBreakdown>,
}

/// `X-Payment` payload presented by the client
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// base64 bytes of a fully-signed chain transaction
    pub serialized_transaction: String,
}

/// `X-Payment-Response` payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub tx_sig: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<PaymentBreakdown>,
}

impl PaymentRequirements {
    /// Challenge for a COMPLETED job: pay the worker the full bounty on
    /// the configured network/asset, with the split advertised when a
    /// platform fee applies.
    pub fn for_job(
        job: &Job,
        network: &str,
        mint: &str,
        platform_wallet: Option<&str>,
        fee_atomic: u64,
    ) -> Self {
        let worker = job.worker_wallet.clone().unwrap_or_default();
        let worker_atomic = job.bounty_atomic - fee_atomic;

        let breakdown = Some(PaymentBreakdown {
            total: job.bounty_atomic.to_string(),
            worker: PaymentParty {
                address: worker.clone(),
                amount: worker_atomic.to_string(),
            },
            platform: platform_wallet.filter(|_| fee_atomic > 0).map(|address| {
                PlatformParty {
                    address: address.to_string(),
                    amount: fee_atomic.to_string(),
                    percent: 100.0 * fee_atomic as f64 / job.bounty_atomic as f64,
                }
            }),
        });

        Self {
            accepts: vec![PaymentAccept {
                scheme: "exact".to_string(),
                network: network.to_string(),
                max_amount_required: job.bounty_atomic.to_string(),
                asset: mint.to_string(),
                pay_to: worker,
            }],
            breakdown,
        }
    }

    /// Display-unit total, for logging
    pub fn total_usdc(&self) -> f64 {
        self.accepts
            .first()
            .and_then(|a| a.max_amount_required.parse().ok())
            .map(atomic_to_usdc)
            .unwrap_or_default()
    }
}

/// Encode a header payload as base64(JSON)
pub fn encode_header<T: Serialize>(payload: &T) -> String {
    // Serialization of our own header types cannot fail
    BASE64.encode(serde_json::to_vec(payload).unwrap_or_default())
}

/// Decode a base64(JSON) header payload
pub fn decode_header<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|_| GigwireError::payment_invalid("malformed payment header encoding"))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| GigwireError::payment_invalid("malformed payment header payload"))
}

/// Decode the transaction bytes inside an `X-Payment` payload
pub fn decode_transaction(payload: &PaymentPayload) -> Result<Vec<u8>> {
    BASE64
        .decode(payload.serialized_transaction.trim())
        .map_err(|_| GigwireError::payment_invalid("malformed serialized transaction"))
}
