//! Gigwire Escrow - deposits held against jobs
//!
//! The ledger records verified deposits and the set of every transaction
//! signature ever consumed as a deposit. Both live under one lock so the
//! replay check and the record insert are a single atomic step.

pub mod coordinator;
pub mod sweeper;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use gigwire_types::{EscrowRecord, EscrowStatus, GigwireError, JobId, Result};

pub use coordinator::{EscrowCoordinator, EscrowSettings};
pub use sweeper::ExpirySweeper;

/// How long consumed deposit signatures are remembered
pub const USED_SIG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Records of verified deposits plus the used-deposit set
pub struct EscrowLedger {
    inner: RwLock<LedgerInner>,
    used_sig_ttl: Duration,
}

struct LedgerInner {
    records: HashMap<JobId, EscrowRecord>,
    /// Signature -> first-seen time, for TTL eviction
    used_sigs: HashMap<String, Instant>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::with_ttl(USED_SIG_TTL)
    }

    pub fn with_ttl(used_sig_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                records: HashMap::new(),
                used_sigs: HashMap::new(),
            }),
            used_sig_ttl,
        }
    }

    /// Whether a signature was already consumed as a deposit
    pub async fn is_sig_used(&self, tx_sig: &str) -> bool {
        self.inner.read().await.used_sigs.contains_key(tx_sig)
    }

    /// The record for a job, if any
    pub async fn get(&self, job_id: &JobId) -> Option<EscrowRecord> {
        self.inner.read().await.records.get(job_id).cloned()
    }

    /// Whether a held record exists for the job
    pub async fn is_held(&self, job_id: &JobId) -> bool {
        self.inner
            .read()
            .await
            .records
            .get(job_id)
            .map(|r| r.is_held())
            .unwrap_or(false)
    }

    /// Atomically consume the deposit signature and store the held record.
    ///
    /// This is the replay gate: the signature check, the one-record-per-job
    /// check, and both inserts happen under a single write lock.
    pub async fn commit_deposit(&self, record: EscrowRecord) -> Result<EscrowRecord> {
        let mut inner = self.inner.write().await;
        if inner.used_sigs.contains_key(&record.deposit_tx_sig) {
            return Err(GigwireError::payment_invalid(
                "deposit transaction already used",
            ));
        }
        if inner.records.contains_key(&record.job_id) {
            return Err(GigwireError::payment_invalid(
                "job already has an escrow deposit",
            ));
        }
        inner
            .used_sigs
            .insert(record.deposit_tx_sig.clone(), Instant::now());
        inner.records.insert(record.job_id.clone(), record.clone());
        Ok(record)
    }

    /// held -> released, binding the worker and the release signature
    pub async fn mark_released(
        &self,
        job_id: &JobId,
        worker_wallet: &str,
        release_tx_sig: &str,
    ) -> Result<EscrowRecord> {
        self.transition(job_id, EscrowStatus::Released, Some(worker_wallet), release_tx_sig)
            .await
    }

    /// held -> refunded
    pub async fn mark_refunded(&self, job_id: &JobId, refund_tx_sig: &str) -> Result<EscrowRecord> {
        self.transition(job_id, EscrowStatus::Refunded, None, refund_tx_sig)
            .await
    }

    async fn transition(
        &self,
        job_id: &JobId,
        to: EscrowStatus,
        worker_wallet: Option<&str>,
        tx_sig: &str,
    ) -> Result<EscrowRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(job_id)
            .ok_or_else(|| GigwireError::EscrowNotFound {
                job_id: job_id.to_string(),
            })?;

        if !record.is_held() {
            return Err(GigwireError::payment_invalid(
                "escrow is no longer held",
            ));
        }

        record.status = to;
        record.release_tx_sig = Some(tx_sig.to_string());
        record.released_at = Some(chrono::Utc::now());
        if let Some(wallet) = worker_wallet {
            record.worker_wallet = Some(wallet.to_string());
        }
        Ok(record.clone())
    }

    /// Evict used signatures older than the TTL. Held records are never
    /// evicted.
    pub async fn sweep_used_sigs(&self) {
        let mut inner = self.inner.write().await;
        let ttl = self.used_sig_ttl;
        let before = inner.used_sigs.len();
        inner.used_sigs.retain(|_, seen| seen.elapsed() < ttl);
        let evicted = before - inner.used_sigs.len();
        if evicted > 0 {
            debug!(evicted, "used-deposit signatures evicted");
        }
    }

    /// Held records, for reconciliation and tests
    pub async fn held_records(&self) -> Vec<EscrowRecord> {
        self.inner
            .read()
            .await
            .records
            .values()
            .filter(|r| r.is_held())
            .cloned()
            .collect()
    }
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(job_id: &JobId, sig: &str) -> EscrowRecord {
        EscrowRecord::held(job_id.clone(), "requester".to_string(), 100_000, sig.to_string())
    }

    #[tokio::test]
    async fn commit_then_release() {
        let ledger = EscrowLedger::new();
        let job_id = JobId::new();
        ledger.commit_deposit(record(&job_id, "sig1")).await.unwrap();

        assert!(ledger.is_held(&job_id).await);
        assert!(ledger.is_sig_used("sig1").await);

        let released = ledger
            .mark_released(&job_id, "worker", "release_sig")
            .await
            .unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(released.worker_wallet.as_deref(), Some("worker"));
        assert_eq!(released.release_tx_sig.as_deref(), Some("release_sig"));
        assert!(!ledger.is_held(&job_id).await);
    }

    #[tokio::test]
    async fn replayed_signature_is_rejected() {
        let ledger = EscrowLedger::new();
        let first = JobId::new();
        let second = JobId::new();

        ledger.commit_deposit(record(&first, "sig1")).await.unwrap();
        let err = ledger
            .commit_deposit(record(&second, "sig1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "payment_invalid");
        assert!(ledger.get(&second).await.is_none());
    }

    #[tokio::test]
    async fn one_deposit_per_job() {
        let ledger = EscrowLedger::new();
        let job_id = JobId::new();

        ledger.commit_deposit(record(&job_id, "sig1")).await.unwrap();
        let err = ledger
            .commit_deposit(record(&job_id, "sig2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "payment_invalid");
        // The losing signature was not consumed
        assert!(!ledger.is_sig_used("sig2").await);
    }

    #[tokio::test]
    async fn terminal_records_cannot_transition_again() {
        let ledger = EscrowLedger::new();
        let job_id = JobId::new();
        ledger.commit_deposit(record(&job_id, "sig1")).await.unwrap();
        ledger.mark_refunded(&job_id, "refund_sig").await.unwrap();

        assert!(ledger
            .mark_released(&job_id, "worker", "sig")
            .await
            .is_err());
        assert!(ledger.mark_refunded(&job_id, "sig").await.is_err());
    }

    #[tokio::test]
    async fn ttl_sweep_evicts_old_signatures() {
        let ledger = EscrowLedger::with_ttl(Duration::from_millis(1));
        let job_id = JobId::new();
        ledger.commit_deposit(record(&job_id, "sig1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        ledger.sweep_used_sigs().await;

        assert!(!ledger.is_sig_used("sig1").await);
        // The record itself survives the sweep
        assert!(ledger.is_held(&job_id).await);
    }
}
