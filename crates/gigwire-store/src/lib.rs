//! Gigwire Store - the system of record for jobs
//!
//! All mutation flows through `compare_and_set`: an update applies only if
//! the job's current status equals the expected status, and the
//! check-and-apply is atomic. That single primitive serializes every
//! per-job transition without a separate lock service; two workers racing
//! to claim the same job produce exactly one winner.
//!
//! A SQL-backed store can implement the same trait with
//! `UPDATE ... WHERE status = $expected RETURNING *`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use gigwire_types::{GigwireError, Job, JobId, JobStatus, Result};

/// Field mutations applied by a conditional update.
///
/// Only the fields a transition touches are set; everything else is left
/// untouched. Timestamps and signatures are write-once by construction:
/// no transition ever sets the same field twice.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub worker_wallet: Option<String>,
    pub result: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub deposit_tx_sig: Option<String>,
    pub payment_tx_sig: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn worker_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.worker_wallet = Some(wallet.into());
        self
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn claimed_at(mut self, at: DateTime<Utc>) -> Self {
        self.claimed_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn paid_at(mut self, at: DateTime<Utc>) -> Self {
        self.paid_at = Some(at);
        self
    }

    pub fn deposit_tx_sig(mut self, sig: impl Into<String>) -> Self {
        self.deposit_tx_sig = Some(sig.into());
        self
    }

    pub fn payment_tx_sig(mut self, sig: impl Into<String>) -> Self {
        self.payment_tx_sig = Some(sig.into());
        self
    }

    fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(wallet) = self.worker_wallet {
            job.worker_wallet = Some(wallet);
        }
        if let Some(result) = self.result {
            job.result = Some(result);
        }
        if let Some(at) = self.claimed_at {
            job.claimed_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(at) = self.paid_at {
            job.paid_at = Some(at);
        }
        if let Some(sig) = self.deposit_tx_sig {
            job.deposit_tx_sig = Some(sig);
        }
        if let Some(sig) = self.payment_tx_sig {
            job.payment_tx_sig = Some(sig);
        }
    }
}

/// Durable storage of job rows with atomic conditional writes
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job; fails if the id exists
    async fn insert(&self, job: Job) -> Result<Job>;

    /// Fetch one job
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// All jobs, optionally filtered by status, newest first
    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>>;

    /// Apply `update` iff the current status equals `expected`.
    /// Returns the updated row, or `None` when the precondition failed.
    async fn compare_and_set(
        &self,
        id: &JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<Option<Job>>;
}

/// In-memory job store
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(GigwireError::internal(format!(
                "duplicate job id {}",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut rows: Vec<Job> = jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn compare_and_set(
        &self,
        id: &JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) if job.status == expected => {
                update.apply(job);
                Ok(Some(job.clone()))
            }
            Some(_) => Ok(None),
            None => Err(GigwireError::JobNotFound {
                job_id: id.to_string(),
            }),
        }
    }
}
