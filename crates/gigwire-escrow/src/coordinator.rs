//! Escrow coordinator - binds off-chain job state to on-chain value
//!
//! The coordinator is the only holder of the escrow signing key's
//! authority. Releases and refunds for one job are serialized by a
//! per-job mutex held across the verify -> sign -> submit sequence, so
//! two conflicting transactions can never be built from the same escrow
//! at once. Store locks are never held across chain calls.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use gigwire_chain::{ChainAdapter, Payout};
use gigwire_service::JobService;
use gigwire_types::{
    platform_fee, EscrowRecord, EscrowStatus, GigwireError, Job, JobId, JobStatus, Result,
};

use crate::EscrowLedger;

/// Settlement configuration
#[derive(Debug, Clone)]
pub struct EscrowSettings {
    /// System escrow wallet receiving deposits
    pub escrow_wallet: String,
    /// Asset mint
    pub mint: String,
    /// Fee recipient; no fee is taken when absent
    pub platform_wallet: Option<String>,
    /// Platform fee in basis points (500 = 5%)
    pub fee_basis_points: u32,
}

impl EscrowSettings {
    /// Effective fee for an amount; zero when no platform wallet is set
    pub fn fee_for(&self, amount_atomic: u64) -> u64 {
        if self.platform_wallet.is_none() {
            return 0;
        }
        platform_fee(amount_atomic, self.fee_basis_points)
    }
}

/// Orchestrates deposit verification, release, and refund
pub struct EscrowCoordinator {
    chain: Arc<dyn ChainAdapter>,
    ledger: Arc<EscrowLedger>,
    jobs: Arc<JobService>,
    settings: EscrowSettings,
    /// Lazily-created per-job locks around chain critical sections
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl EscrowCoordinator {
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        ledger: Arc<EscrowLedger>,
        jobs: Arc<JobService>,
        settings: EscrowSettings,
    ) -> Self {
        Self {
            chain,
            ledger,
            jobs,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &EscrowSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<EscrowLedger> {
        &self.ledger
    }

    async fn job_lock(&self, id: &JobId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// Verify a deposit and activate the job: PENDING_DEPOSIT -> OPEN.
    ///
    /// The transaction qualifies iff the escrow wallet's post-balance
    /// delta for the configured mint covers the bounty. The sender side
    /// is advisory only.
    pub async fn activate_with_deposit(&self, job_id: &JobId, tx_sig: &str) -> Result<Job> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        let job = self.jobs.get(job_id).await?;
        if job.status != JobStatus::PendingDeposit {
            return Err(GigwireError::InvalidState {
                job_id: job_id.to_string(),
                current: job.status,
                action: "activate",
            });
        }

        // Fast replay checks before any chain round-trip; the commit
        // below re-checks atomically.
        if self.ledger.is_sig_used(tx_sig).await {
            return Err(GigwireError::payment_invalid(
                "deposit transaction already used",
            ));
        }
        if self.ledger.get(job_id).await.is_some() {
            return Err(GigwireError::payment_invalid(
                "job already has an escrow deposit",
            ));
        }

        self.chain.confirm(tx_sig).await?;
        let transfer = self.chain.get_confirmed(tx_sig).await?;

        let received = transfer.received_by(&self.settings.escrow_wallet, &self.settings.mint);
        if received < job.bounty_atomic as i128 {
            return Err(GigwireError::payment_invalid(
                "deposit does not fund the escrow wallet with the bounty amount",
            ));
        }
        if transfer.received_by(&job.requester_wallet, &self.settings.mint) >= 0 {
            // Advisory only; third-party funding is accepted
            warn!(%job_id, tx_sig, "deposit not funded by the requester wallet");
        }

        self.ledger
            .commit_deposit(EscrowRecord::held(
                job_id.clone(),
                job.requester_wallet.clone(),
                job.bounty_atomic,
                tx_sig.to_string(),
            ))
            .await?;

        info!(%job_id, tx_sig, amount_atomic = job.bounty_atomic, "escrow deposit verified");
        self.jobs.activate(job_id, tx_sig).await
    }

    /// Release held funds to the worker with the platform fee split, then
    /// settle the job: COMPLETED -> PAID.
    pub async fn release_to_worker(&self, job_id: &JobId) -> Result<Job> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        let job = self.jobs.get(job_id).await?;
        match job.status {
            // The paywall path won; funds stay held for reconciliation
            JobStatus::Paid => return Ok(job),
            JobStatus::Completed => {}
            current => {
                return Err(GigwireError::InvalidState {
                    job_id: job_id.to_string(),
                    current,
                    action: "settle",
                })
            }
        }

        let record = self
            .ledger
            .get(job_id)
            .await
            .ok_or_else(|| GigwireError::EscrowNotFound {
                job_id: job_id.to_string(),
            })?;

        // A prior release moved the funds but lost the mark_paid commit;
        // finish the job transition with the recorded signature.
        if record.status == EscrowStatus::Released {
            let sig = record.release_tx_sig.ok_or_else(|| {
                GigwireError::internal("released escrow record without signature")
            })?;
            return self.jobs.mark_paid(job_id, &sig).await;
        }
        if !record.is_held() {
            return Err(GigwireError::payment_invalid("escrow is no longer held"));
        }

        let worker = job
            .worker_wallet
            .clone()
            .ok_or_else(|| GigwireError::internal("completed job without a worker"))?;

        let fee = self.settings.fee_for(record.amount_atomic);
        let worker_amount = record.amount_atomic - fee;

        let mut payouts = vec![Payout {
            recipient: worker.clone(),
            amount_atomic: worker_amount,
        }];
        if fee > 0 {
            // fee_for already guaranteed the wallet is present
            if let Some(platform) = &self.settings.platform_wallet {
                payouts.push(Payout {
                    recipient: platform.clone(),
                    amount_atomic: fee,
                });
            }
        }

        // On failure the record stays held and the release is retryable
        let release_sig = self.chain.send_payout(&payouts).await?;

        self.ledger
            .mark_released(job_id, &worker, &release_sig)
            .await?;
        info!(%job_id, release_sig, worker_amount, fee, "escrow released");

        self.jobs.mark_paid(job_id, &release_sig).await
    }

    /// Cancel a job, refunding the escrow when one is held.
    ///
    /// The state commit happens first so a concurrent claim cannot win
    /// after the cancel; a refund failure leaves the record held and a
    /// repeated cancel retries only the refund.
    pub async fn cancel_job(&self, job_id: &JobId, requester_wallet: &str) -> Result<Job> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        let job = self.jobs.get(job_id).await?;
        let job = match job.status {
            JobStatus::Cancelled if self.ledger.is_held(job_id).await => {
                if job.requester_wallet != requester_wallet {
                    return Err(GigwireError::unauthorized(
                        "only the requester can cancel this job",
                    ));
                }
                job
            }
            _ => self.jobs.cancel(job_id, requester_wallet).await?,
        };

        if self.ledger.is_held(job_id).await {
            self.refund_locked(job_id).await?;
        }
        Ok(job)
    }

    /// Expire an overdue OPEN job, refunding the escrow when one is held.
    /// Idempotent; driven by the background sweep.
    pub async fn expire_job(&self, job_id: &JobId) -> Result<Job> {
        let lock = self.job_lock(job_id).await;
        let _guard = lock.lock().await;

        let job = self.jobs.get(job_id).await?;
        let job = match job.status {
            JobStatus::Expired => job,
            _ => self.jobs.expire(job_id).await?,
        };

        if self.ledger.is_held(job_id).await {
            self.refund_locked(job_id).await?;
        }
        Ok(job)
    }

    /// Refund the full held amount to the requester, no fee.
    /// Caller must hold the per-job lock.
    async fn refund_locked(&self, job_id: &JobId) -> Result<EscrowRecord> {
        let record = self
            .ledger
            .get(job_id)
            .await
            .ok_or_else(|| GigwireError::EscrowNotFound {
                job_id: job_id.to_string(),
            })?;
        if !record.is_held() {
            return Err(GigwireError::payment_invalid("escrow is no longer held"));
        }

        let refund_sig = self
            .chain
            .send_payout(&[Payout {
                recipient: record.requester_wallet.clone(),
                amount_atomic: record.amount_atomic,
            }])
            .await?;

        let record = self.ledger.mark_refunded(job_id, &refund_sig).await?;
        info!(%job_id, refund_sig, amount_atomic = record.amount_atomic, "escrow refunded");
        Ok(record)
    }

    /// Expired-deadline OPEN jobs, for the sweep
    pub async fn overdue_open_jobs(&self) -> Result<Vec<Job>> {
        let now = Utc::now();
        Ok(self
            .jobs
            .list(Some(JobStatus::Open))
            .await?
            .into_iter()
            .filter(|j| j.is_past_deadline(now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigwire_chain::MockChainAdapter;
    use gigwire_service::EventBus;
    use gigwire_store::MemoryJobStore;
    use gigwire_types::CreateJobInput;

    const REQUESTER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const WORKER: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const PLATFORM: &str = "So11111111111111111111111111111111111111112";
    const ESCROW: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    struct Harness {
        jobs: Arc<JobService>,
        chain: Arc<MockChainAdapter>,
        coordinator: EscrowCoordinator,
    }

    fn harness(fee_basis_points: u32, platform_wallet: Option<&str>) -> Harness {
        let jobs = Arc::new(JobService::new(
            Arc::new(MemoryJobStore::new()),
            EventBus::default(),
            chrono::Duration::hours(24),
        ));
        let chain = Arc::new(MockChainAdapter::new(MINT, ESCROW));
        let ledger = Arc::new(EscrowLedger::new());
        let coordinator = EscrowCoordinator::new(
            chain.clone(),
            ledger,
            jobs.clone(),
            EscrowSettings {
                escrow_wallet: ESCROW.to_string(),
                mint: MINT.to_string(),
                platform_wallet: platform_wallet.map(String::from),
                fee_basis_points,
            },
        );
        Harness {
            jobs,
            chain,
            coordinator,
        }
    }

    fn input() -> CreateJobInput {
        CreateJobInput {
            title: "t".to_string(),
            description: "d".to_string(),
            bounty_usdc: 0.1,
            requester_wallet: REQUESTER.to_string(),
            tags: vec![],
        }
    }

    async fn funded_open_job(h: &Harness, deposit_sig: &str) -> Job {
        let job = h.jobs.create(input()).await.unwrap();
        h.chain
            .register_deposit(deposit_sig, REQUESTER, job.bounty_atomic)
            .await;
        h.coordinator
            .activate_with_deposit(&job.id, deposit_sig)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn deposit_verification_activates_job() {
        let h = harness(0, None);
        let job = funded_open_job(&h, "dep_sig").await;
        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.deposit_tx_sig.as_deref(), Some("dep_sig"));
        assert!(h.coordinator.ledger().is_held(&job.id).await);
    }

    #[tokio::test]
    async fn underfunded_deposit_is_rejected() {
        let h = harness(0, None);
        let job = h.jobs.create(input()).await.unwrap();
        h.chain
            .register_deposit("dep_sig", REQUESTER, job.bounty_atomic - 1)
            .await;

        let err = h
            .coordinator
            .activate_with_deposit(&job.id, "dep_sig")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "payment_invalid");
        assert_eq!(
            h.jobs.get(&job.id).await.unwrap().status,
            JobStatus::PendingDeposit
        );
        // Failed verification does not consume the signature
        assert!(!h.coordinator.ledger().is_sig_used("dep_sig").await);
    }

    #[tokio::test]
    async fn deposit_replay_across_jobs_is_rejected() {
        let h = harness(0, None);
        let first = funded_open_job(&h, "dep_sig").await;
        assert_eq!(first.status, JobStatus::Open);

        let second = h.jobs.create(input()).await.unwrap();
        let err = h
            .coordinator
            .activate_with_deposit(&second.id, "dep_sig")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "payment_invalid");
        assert_eq!(err.to_string(), "Payment invalid: deposit transaction already used");
    }

    #[tokio::test]
    async fn release_pays_worker_and_platform_in_one_transaction() {
        let h = harness(500, Some(PLATFORM));
        let job = funded_open_job(&h, "dep_sig").await;
        h.jobs.claim(&job.id, WORKER).await.unwrap();
        h.jobs.complete(&job.id, WORKER, "RESULT").await.unwrap();

        let job = h.coordinator.release_to_worker(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Paid);

        let payouts = h.chain.recorded_payouts().await;
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].len(), 2);
        assert_eq!(payouts[0][0].recipient, WORKER);
        assert_eq!(payouts[0][0].amount_atomic, 95_000);
        assert_eq!(payouts[0][1].recipient, PLATFORM);
        assert_eq!(payouts[0][1].amount_atomic, 5_000);

        let record = h.coordinator.ledger().get(&job.id).await.unwrap();
        assert_eq!(record.status, EscrowStatus::Released);
        assert_eq!(record.release_tx_sig, job.payment_tx_sig);
    }

    #[tokio::test]
    async fn release_without_fee_pays_full_bounty() {
        let h = harness(500, None);
        let job = funded_open_job(&h, "dep_sig").await;
        h.jobs.claim(&job.id, WORKER).await.unwrap();
        h.jobs.complete(&job.id, WORKER, "RESULT").await.unwrap();

        h.coordinator.release_to_worker(&job.id).await.unwrap();

        let payouts = h.chain.recorded_payouts().await;
        assert_eq!(payouts[0].len(), 1);
        assert_eq!(payouts[0][0].amount_atomic, 100_000);
    }

    #[tokio::test]
    async fn failed_release_keeps_escrow_held() {
        let h = harness(0, None);
        let job = funded_open_job(&h, "dep_sig").await;
        h.jobs.claim(&job.id, WORKER).await.unwrap();
        h.jobs.complete(&job.id, WORKER, "RESULT").await.unwrap();

        h.chain.fail_next_payout(true);
        let err = h.coordinator.release_to_worker(&job.id).await.unwrap_err();
        assert_eq!(err.kind(), "payment_backend");
        assert!(h.coordinator.ledger().is_held(&job.id).await);
        assert_eq!(
            h.jobs.get(&job.id).await.unwrap().status,
            JobStatus::Completed
        );

        // Retry succeeds once the backend recovers
        h.chain.fail_next_payout(false);
        let job = h.coordinator.release_to_worker(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Paid);
    }

    #[tokio::test]
    async fn cancel_refunds_held_escrow() {
        let h = harness(500, Some(PLATFORM));
        let job = funded_open_job(&h, "dep_sig").await;

        let job = h.coordinator.cancel_job(&job.id, REQUESTER).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        let record = h.coordinator.ledger().get(&job.id).await.unwrap();
        assert_eq!(record.status, EscrowStatus::Refunded);

        // Refund carries no fee
        let payouts = h.chain.recorded_payouts().await;
        assert_eq!(payouts[0].len(), 1);
        assert_eq!(payouts[0][0].recipient, REQUESTER);
        assert_eq!(payouts[0][0].amount_atomic, 100_000);
    }

    #[tokio::test]
    async fn cancel_retry_after_failed_refund() {
        let h = harness(0, None);
        let job = funded_open_job(&h, "dep_sig").await;

        h.chain.fail_next_payout(true);
        let err = h.coordinator.cancel_job(&job.id, REQUESTER).await.unwrap_err();
        assert_eq!(err.kind(), "payment_backend");
        // State committed, refund pending
        assert_eq!(
            h.jobs.get(&job.id).await.unwrap().status,
            JobStatus::Cancelled
        );
        assert!(h.coordinator.ledger().is_held(&job.id).await);

        h.chain.fail_next_payout(false);
        let job = h.coordinator.cancel_job(&job.id, REQUESTER).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(!h.coordinator.ledger().is_held(&job.id).await);
    }

    #[tokio::test]
    async fn cancel_of_unfunded_job_skips_chain() {
        let h = harness(0, None);
        let job = h.jobs.create(input()).await.unwrap();

        let job = h.coordinator.cancel_job(&job.id, REQUESTER).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(h.chain.recorded_payouts().await.is_empty());
    }

    #[tokio::test]
    async fn release_after_paywall_settlement_is_noop() {
        let h = harness(0, None);
        let job = funded_open_job(&h, "dep_sig").await;
        h.jobs.claim(&job.id, WORKER).await.unwrap();
        h.jobs.complete(&job.id, WORKER, "RESULT").await.unwrap();
        h.jobs.mark_paid(&job.id, "paywall_sig").await.unwrap();

        let job = h.coordinator.release_to_worker(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Paid);
        assert_eq!(job.payment_tx_sig.as_deref(), Some("paywall_sig"));
        // No payout was built
        assert!(h.chain.recorded_payouts().await.is_empty());
        assert!(h.coordinator.ledger().is_held(&job.id).await);
    }
}
