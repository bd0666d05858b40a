//! Escrow types for Gigwire
//!
//! An escrow record binds a verified on-chain deposit to a job. Records
//! are created on deposit verification and mutated exactly once, at
//! release or refund.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// State of an escrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    /// Deposit verified, funds held by the escrow wallet
    Held,
    /// Paid out to the worker (minus platform fee)
    Released,
    /// Returned in full to the requester
    Refunded,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

/// A verified deposit held against a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    pub job_id: JobId,
    pub requester_wallet: String,
    /// Bound at release time
    pub worker_wallet: Option<String>,
    /// Equals the job's bounty_atomic at verification time
    pub amount_atomic: u64,
    /// Unique across all escrow records
    pub deposit_tx_sig: String,
    pub status: EscrowStatus,
    /// Set exactly once on the terminal transition
    pub release_tx_sig: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// Create a freshly-held record for a verified deposit
    pub fn held(
        job_id: JobId,
        requester_wallet: String,
        amount_atomic: u64,
        deposit_tx_sig: String,
    ) -> Self {
        Self {
            job_id,
            requester_wallet,
            worker_wallet: None,
            amount_atomic,
            deposit_tx_sig,
            status: EscrowStatus::Held,
            release_tx_sig: None,
            released_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.status == EscrowStatus::Held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_held() {
        let record = EscrowRecord::held(
            JobId::new(),
            "req".to_string(),
            100_000,
            "sig1".to_string(),
        );
        assert!(record.is_held());
        assert!(!record.status.is_terminal());
        assert!(record.release_tx_sig.is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EscrowStatus::Held).unwrap(),
            "\"held\""
        );
        assert_eq!(
            serde_json::to_string(&EscrowStatus::Refunded).unwrap(),
            "\"refunded\""
        );
    }
}
