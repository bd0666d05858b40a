//! Job types for Gigwire
//!
//! A job is the central entity: posted by a requester with a bounty,
//! claimed and fulfilled by a worker, settled through the paywall or an
//! escrow release.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{usdc_to_atomic, GigwireError, Result};

/// Bounds on job fields, enforced at creation.
pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 5_000;
pub const RESULT_MAX: usize = 100_000;
pub const TAGS_MAX: usize = 10;
pub const TAG_LEN_MAX: usize = 32;

/// Unique job identifier: `job_` followed by 8 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random id
    pub fn new() -> Self {
        let n: u32 = rand::thread_rng().gen();
        Self(format!("job_{:08x}", n))
    }

    /// Parse and validate an id string
    pub fn parse(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix("job_")
            .filter(|h| h.len() == 8 && h.chars().all(|c| c.is_ascii_hexdigit()));
        match hex {
            Some(_) => Ok(Self(s.to_string())),
            None => Err(GigwireError::validation("jobId", "malformed job id")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, waiting for the escrow deposit
    PendingDeposit,
    /// Deposit verified, open for claims
    Open,
    /// Bound to a worker
    Claimed,
    /// Result delivered, awaiting settlement
    Completed,
    /// Settled; result freely retrievable
    Paid,
    /// Cancelled by the requester before claim
    Cancelled,
    /// Deadline passed while open
    Expired,
}

impl JobStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled | Self::Expired)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingDeposit => "PENDING_DEPOSIT",
            Self::Open => "OPEN",
            Self::Claimed => "CLAIMED",
            Self::Completed => "COMPLETED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// A job in the marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique id, stable for the job's lifetime
    pub id: JobId,
    pub title: String,
    pub description: String,
    /// Display-unit bounty as posted; presentation only after creation
    pub bounty_usdc: f64,
    /// Authoritative bounty in atomic units
    pub bounty_atomic: u64,
    pub requester_wallet: String,
    /// Bound at claim time
    pub worker_wallet: Option<String>,
    pub status: JobStatus,
    /// Present iff status is COMPLETED or PAID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Escrow deposit transaction, once verified
    pub deposit_tx_sig: Option<String>,
    /// Settlement transaction (paywall payment or escrow release)
    pub payment_tx_sig: Option<String>,
    /// Deadline after which an OPEN job may expire
    pub expires_at: DateTime<Utc>,
}

/// Input to job creation, already schema-validated by the HTTP layer
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobInput {
    pub title: String,
    pub description: String,
    pub bounty_usdc: f64,
    pub requester_wallet: String,
    pub tags: Vec<String>,
}

impl Job {
    /// Build a new PENDING_DEPOSIT job from validated input.
    ///
    /// Computes `bounty_atomic` from the display amount exactly once; the
    /// pair never changes afterwards.
    pub fn create(input: CreateJobInput, ttl: chrono::Duration) -> Result<Self> {
        let bounty_atomic = usdc_to_atomic(input.bounty_usdc).ok_or_else(|| {
            GigwireError::validation("bountyUsdc", "bounty must be > 0 and at most 1000 USDC")
        })?;
        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            title: input.title,
            description: input.description,
            bounty_usdc: input.bounty_usdc,
            bounty_atomic,
            requester_wallet: input.requester_wallet,
            worker_wallet: None,
            status: JobStatus::PendingDeposit,
            result: None,
            tags: input.tags,
            created_at: now,
            claimed_at: None,
            completed_at: None,
            paid_at: None,
            deposit_tx_sig: None,
            payment_tx_sig: None,
            expires_at: now + ttl,
        })
    }

    /// Whether the open-claim deadline has passed
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(bounty: f64) -> CreateJobInput {
        CreateJobInput {
            title: "t".to_string(),
            description: "d".to_string(),
            bounty_usdc: bounty,
            requester_wallet: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            tags: vec![],
        }
    }

    #[test]
    fn job_id_format() {
        let id = JobId::new();
        assert!(id.as_str().starts_with("job_"));
        assert_eq!(id.as_str().len(), 12);
        assert!(JobId::parse(id.as_str()).is_ok());
        assert!(JobId::parse("job_xyz").is_err());
        assert!(JobId::parse("task_00000001").is_err());
    }

    #[test]
    fn create_computes_atomic_once() {
        let job = Job::create(input(0.1), chrono::Duration::hours(24)).unwrap();
        assert_eq!(job.status, JobStatus::PendingDeposit);
        assert_eq!(job.bounty_atomic, 100_000);
        assert!(job.worker_wallet.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn create_rejects_out_of_range_bounty() {
        assert!(Job::create(input(1000.000001), chrono::Duration::hours(24)).is_err());
        assert!(Job::create(input(0.0), chrono::Duration::hours(24)).is_err());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&JobStatus::PendingDeposit).unwrap();
        assert_eq!(json, "\"PENDING_DEPOSIT\"");
        let back: JobStatus = serde_json::from_str("\"OPEN\"").unwrap();
        assert_eq!(back, JobStatus::Open);
    }

    #[test]
    fn job_serializes_camel_case() {
        let job = Job::create(input(1.0), chrono::Duration::hours(24)).unwrap();
        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("bountyUsdc").is_some());
        assert!(json.get("bountyAtomic").is_some());
        assert!(json.get("requesterWallet").is_some());
        // Absent result is omitted entirely
        assert!(json.get("result").is_none());
    }
}
