//! Gigwire Service - the job lifecycle state machine
//!
//! The job service is the only mutator of job state. Every transition is
//! expressed as a conditional update against the store: the service
//! re-reads the job inside `compare_and_set` and never trusts a
//! caller-supplied current state. After each committed transition it
//! publishes a lifecycle event to the bus.
//!
//! ```text
//! PENDING_DEPOSIT → OPEN → CLAIMED → COMPLETED → PAID
//!        └→ CANCELLED   └→ CANCELLED / EXPIRED
//! ```

pub mod bus;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use gigwire_store::{JobStore, JobUpdate};
use gigwire_types::{
    require_valid_wallet, CreateJobInput, GigwireError, Job, JobEvent, JobEventKind, JobId,
    JobStatus, Result, DESCRIPTION_MAX, RESULT_MAX, TAGS_MAX, TAG_LEN_MAX, TITLE_MAX,
};

pub use bus::EventBus;

/// Authoritative transition enforcer over the job store
pub struct JobService {
    store: Arc<dyn JobStore>,
    bus: EventBus,
    /// Open-claim lifetime granted at creation
    expiry_ttl: chrono::Duration,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, bus: EventBus, expiry_ttl: chrono::Duration) -> Self {
        Self {
            store,
            bus,
            expiry_ttl,
        }
    }

    /// The bus this service publishes to
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Create a job in PENDING_DEPOSIT
    pub async fn create(&self, input: CreateJobInput) -> Result<Job> {
        validate_create(&input)?;
        let job = Job::create(input, self.expiry_ttl)?;
        let job = self.store.insert(job).await?;
        info!(job_id = %job.id, bounty_atomic = job.bounty_atomic, "job created");
        Ok(job)
    }

    /// PENDING_DEPOSIT → OPEN once the escrow deposit is verified
    pub async fn activate(&self, id: &JobId, deposit_tx_sig: &str) -> Result<Job> {
        let update = JobUpdate::status(JobStatus::Open).deposit_tx_sig(deposit_tx_sig);
        let Some(job) = self
            .store
            .compare_and_set(id, JobStatus::PendingDeposit, update)
            .await?
        else {
            return Err(self.state_error(id, "activate").await);
        };

        info!(job_id = %job.id, deposit_tx_sig, "job activated");
        self.bus.publish(JobEvent::new(JobEventKind::JobNew, job.clone()));
        Ok(job)
    }

    /// OPEN → CLAIMED, binding the worker
    pub async fn claim(&self, id: &JobId, worker_wallet: &str) -> Result<Job> {
        require_valid_wallet("workerWallet", worker_wallet)?;
        let job = self.get(id).await?;
        if job.requester_wallet == worker_wallet {
            return Err(GigwireError::validation(
                "workerWallet",
                "worker cannot claim their own job",
            ));
        }

        let update = JobUpdate::status(JobStatus::Claimed)
            .worker_wallet(worker_wallet)
            .claimed_at(Utc::now());
        let Some(job) = self.store.compare_and_set(id, JobStatus::Open, update).await? else {
            return Err(self.state_error(id, "claim").await);
        };

        info!(job_id = %job.id, worker_wallet, "job claimed");
        self.bus
            .publish(JobEvent::new(JobEventKind::JobClaimed, job.clone()));
        Ok(job)
    }

    /// CLAIMED → COMPLETED with the delivered result
    pub async fn complete(&self, id: &JobId, worker_wallet: &str, result: &str) -> Result<Job> {
        if result.is_empty() || result.len() > RESULT_MAX {
            return Err(GigwireError::validation(
                "result",
                "result must be between 1 and 100000 characters",
            ));
        }

        let job = self.get(id).await?;
        // The bound worker never changes after CLAIMED, so this check is
        // stable across the following conditional update.
        if job.worker_wallet.as_deref() != Some(worker_wallet) {
            return Err(GigwireError::unauthorized(
                "only the assigned worker can complete this job",
            ));
        }

        let update = JobUpdate::status(JobStatus::Completed)
            .result(result)
            .completed_at(Utc::now());
        let Some(job) = self
            .store
            .compare_and_set(id, JobStatus::Claimed, update)
            .await?
        else {
            return Err(self.state_error(id, "complete").await);
        };

        info!(job_id = %job.id, result_len = result.len(), "job completed");
        self.bus
            .publish(JobEvent::new(JobEventKind::JobCompleted, job.clone()));
        Ok(job)
    }

    /// PENDING_DEPOSIT/OPEN → CANCELLED by the requester.
    ///
    /// Escrow refunds are orchestrated above this layer; the state commit
    /// happens first so a concurrent claim cannot win after the cancel.
    pub async fn cancel(&self, id: &JobId, requester_wallet: &str) -> Result<Job> {
        let job = self.get(id).await?;
        if job.requester_wallet != requester_wallet {
            return Err(GigwireError::unauthorized(
                "only the requester can cancel this job",
            ));
        }

        let from = match job.status {
            JobStatus::PendingDeposit | JobStatus::Open => job.status,
            current => {
                return Err(GigwireError::InvalidState {
                    job_id: id.to_string(),
                    current,
                    action: "cancel",
                })
            }
        };

        let Some(job) = self
            .store
            .compare_and_set(id, from, JobUpdate::status(JobStatus::Cancelled))
            .await?
        else {
            return Err(self.state_error(id, "cancel").await);
        };

        info!(job_id = %job.id, "job cancelled");
        Ok(job)
    }

    /// OPEN → EXPIRED once the deadline has passed
    pub async fn expire(&self, id: &JobId) -> Result<Job> {
        let job = self.get(id).await?;
        if !job.is_past_deadline(Utc::now()) {
            return Err(GigwireError::InvalidState {
                job_id: id.to_string(),
                current: job.status,
                action: "expire",
            });
        }

        let Some(job) = self
            .store
            .compare_and_set(id, JobStatus::Open, JobUpdate::status(JobStatus::Expired))
            .await?
        else {
            return Err(self.state_error(id, "expire").await);
        };

        info!(job_id = %job.id, "job expired");
        Ok(job)
    }

    /// COMPLETED → PAID with the settlement signature.
    ///
    /// Idempotent: a job that is already PAID is returned as-is, so the
    /// losing settlement path (or a retry after a lost race) observes
    /// success with the winning signature.
    pub async fn mark_paid(&self, id: &JobId, payment_tx_sig: &str) -> Result<Job> {
        let job = self.get(id).await?;
        if job.status == JobStatus::Paid {
            return Ok(job);
        }

        let update = JobUpdate::status(JobStatus::Paid)
            .payment_tx_sig(payment_tx_sig)
            .paid_at(Utc::now());
        match self
            .store
            .compare_and_set(id, JobStatus::Completed, update)
            .await?
        {
            Some(job) => {
                info!(job_id = %job.id, payment_tx_sig, "job paid");
                self.bus
                    .publish(JobEvent::new(JobEventKind::JobPaid, job.clone()));
                Ok(job)
            }
            None => {
                // Lost the settlement race, or the job was never COMPLETED
                let job = self.get(id).await?;
                if job.status == JobStatus::Paid {
                    Ok(job)
                } else {
                    Err(GigwireError::InvalidState {
                        job_id: id.to_string(),
                        current: job.status,
                        action: "settle",
                    })
                }
            }
        }
    }

    /// Fetch one job or fail with not_found
    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| GigwireError::JobNotFound {
                job_id: id.to_string(),
            })
    }

    /// All jobs, optionally filtered by status, newest first
    pub async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        self.store.list(status).await
    }

    /// Build a state error for a failed conditional update, reporting
    /// the status actually observed after the miss.
    async fn state_error(&self, id: &JobId, action: &'static str) -> GigwireError {
        match self.store.get(id).await {
            Ok(Some(job)) => GigwireError::InvalidState {
                job_id: id.to_string(),
                current: job.status,
                action,
            },
            _ => GigwireError::JobNotFound {
                job_id: id.to_string(),
            },
        }
    }
}

fn validate_create(input: &CreateJobInput) -> Result<()> {
    if input.title.is_empty() || input.title.len() > TITLE_MAX {
        return Err(GigwireError::validation(
            "title",
            "title must be between 1 and 200 characters",
        ));
    }
    if input.description.is_empty() || input.description.len() > DESCRIPTION_MAX {
        return Err(GigwireError::validation(
            "description",
            "description must be between 1 and 5000 characters",
        ));
    }
    if input.tags.len() > TAGS_MAX
        || input
            .tags
            .iter()
            .any(|t| t.is_empty() || t.len() > TAG_LEN_MAX)
    {
        return Err(GigwireError::validation(
            "tags",
            "at most 10 tags of 1 to 32 characters each",
        ));
    }
    require_valid_wallet("requesterWallet", &input.requester_wallet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigwire_store::MemoryJobStore;

    const REQUESTER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const WORKER: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn service() -> JobService {
        JobService::new(
            Arc::new(MemoryJobStore::new()),
            EventBus::default(),
            chrono::Duration::hours(24),
        )
    }

    fn input() -> CreateJobInput {
        CreateJobInput {
            title: "Summarize dataset".to_string(),
            description: "Summarize the attached dataset".to_string(),
            bounty_usdc: 0.1,
            requester_wallet: REQUESTER.to_string(),
            tags: vec![],
        }
    }

    async fn completed_job(service: &JobService) -> Job {
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "deposit_sig").await.unwrap();
        service.claim(&job.id, WORKER).await.unwrap();
        service.complete(&job.id, WORKER, "RESULT").await.unwrap()
    }

    #[tokio::test]
    async fn full_lifecycle_happy_path() {
        let service = service();
        let job = service.create(input()).await.unwrap();
        assert_eq!(job.status, JobStatus::PendingDeposit);
        assert_eq!(job.bounty_atomic, 100_000);

        let job = service.activate(&job.id, "dep_sig").await.unwrap();
        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.deposit_tx_sig.as_deref(), Some("dep_sig"));

        let job = service.claim(&job.id, WORKER).await.unwrap();
        assert_eq!(job.status, JobStatus::Claimed);
        assert!(job.claimed_at.is_some());

        let job = service.complete(&job.id, WORKER, "RESULT").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some("RESULT"));

        let job = service.mark_paid(&job.id, "pay_sig").await.unwrap();
        assert_eq!(job.status, JobStatus::Paid);
        assert_eq!(job.payment_tx_sig.as_deref(), Some("pay_sig"));

        // Timestamps are monotone along the lifecycle
        assert!(job.created_at <= job.claimed_at.unwrap());
        assert!(job.claimed_at.unwrap() <= job.completed_at.unwrap());
        assert!(job.completed_at.unwrap() <= job.paid_at.unwrap());
    }

    #[tokio::test]
    async fn events_are_published_per_transition() {
        let service = service();
        let mut rx = service.bus().subscribe();

        completed_job(&service).await;

        assert_eq!(rx.recv().await.unwrap().kind, JobEventKind::JobNew);
        assert_eq!(rx.recv().await.unwrap().kind, JobEventKind::JobClaimed);
        assert_eq!(rx.recv().await.unwrap().kind, JobEventKind::JobCompleted);
    }

    #[tokio::test]
    async fn non_adjacent_transitions_are_state_errors() {
        let service = service();
        let job = service.create(input()).await.unwrap();

        // PENDING_DEPOSIT cannot be claimed or completed
        assert_eq!(service.claim(&job.id, WORKER).await.unwrap_err().kind(), "state_error");
        assert_eq!(
            service.mark_paid(&job.id, "sig").await.unwrap_err().kind(),
            "state_error"
        );
    }

    #[tokio::test]
    async fn requester_cannot_claim_own_job() {
        let service = service();
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "dep").await.unwrap();

        let err = service.claim(&job.id, REQUESTER).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn only_assigned_worker_completes() {
        let service = service();
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "dep").await.unwrap();
        service.claim(&job.id, WORKER).await.unwrap();

        let err = service
            .complete(&job.id, REQUESTER, "RESULT")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authorization");
    }

    #[tokio::test]
    async fn only_requester_cancels() {
        let service = service();
        let job = service.create(input()).await.unwrap();

        let err = service.cancel(&job.id, WORKER).await.unwrap_err();
        assert_eq!(err.kind(), "authorization");

        let job = service.cancel(&job.id, REQUESTER).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_after_claim_is_rejected() {
        let service = service();
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "dep").await.unwrap();
        service.claim(&job.id, WORKER).await.unwrap();

        let err = service.cancel(&job.id, REQUESTER).await.unwrap_err();
        assert_eq!(err.kind(), "state_error");
    }

    #[tokio::test]
    async fn mark_paid_twice_is_noop_success() {
        let service = service();
        let job = completed_job(&service).await;

        let first = service.mark_paid(&job.id, "sig_a").await.unwrap();
        let second = service.mark_paid(&job.id, "sig_b").await.unwrap();

        assert_eq!(second.status, JobStatus::Paid);
        // Exactly one settlement signature wins
        assert_eq!(second.payment_tx_sig, first.payment_tx_sig);
        assert_eq!(second.payment_tx_sig.as_deref(), Some("sig_a"));
        assert_eq!(second.paid_at, first.paid_at);
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let service = Arc::new(service());
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "dep").await.unwrap();

        let workers = [
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "So11111111111111111111111111111111111111112",
            "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T",
        ];
        let mut handles = Vec::new();
        for worker in workers {
            let service = service.clone();
            let id = job.id.clone();
            handles.push(tokio::spawn(async move {
                service.claim(&id, worker).await
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(job) => {
                    assert_eq!(job.status, JobStatus::Claimed);
                    wins += 1;
                }
                Err(e) => {
                    assert_eq!(e.kind(), "state_error");
                    losses += 1;
                }
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 2);
    }

    #[tokio::test]
    async fn expire_requires_past_deadline() {
        let service = service();
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "dep").await.unwrap();

        // Deadline is 24h out
        assert_eq!(service.expire(&job.id).await.unwrap_err().kind(), "state_error");

        let quick = JobService::new(
            Arc::new(MemoryJobStore::new()),
            EventBus::default(),
            chrono::Duration::milliseconds(-1),
        );
        let job = quick.create(input()).await.unwrap();
        quick.activate(&job.id, "dep").await.unwrap();
        let job = quick.expire(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Expired);
    }

    #[tokio::test]
    async fn create_validates_bounds() {
        let service = service();

        let mut bad = input();
        bad.title = String::new();
        assert_eq!(service.create(bad).await.unwrap_err().kind(), "validation");

        let mut bad = input();
        bad.description = "x".repeat(DESCRIPTION_MAX + 1);
        assert_eq!(service.create(bad).await.unwrap_err().kind(), "validation");

        let mut bad = input();
        bad.requester_wallet = "nope".to_string();
        assert_eq!(service.create(bad).await.unwrap_err().kind(), "validation");

        let mut bad = input();
        bad.bounty_usdc = 1000.000001;
        assert_eq!(service.create(bad).await.unwrap_err().kind(), "validation");
    }

    #[tokio::test]
    async fn result_length_bounds() {
        let service = service();
        let job = service.create(input()).await.unwrap();
        service.activate(&job.id, "dep").await.unwrap();
        service.claim(&job.id, WORKER).await.unwrap();

        let too_long = "x".repeat(RESULT_MAX + 1);
        assert_eq!(
            service
                .complete(&job.id, WORKER, &too_long)
                .await
                .unwrap_err()
                .kind(),
            "validation"
        );

        let max = "x".repeat(RESULT_MAX);
        let job = service.complete(&job.id, WORKER, &max).await.unwrap();
        assert_eq!(job.result.unwrap().len(), RESULT_MAX);
    }
}
