//! Background expiry sweep
//!
//! Scans OPEN jobs past their deadline on a fixed interval and drives the
//! EXPIRED transition (refunding held escrow). Also evicts aged entries
//! from the used-deposit set. Failures are logged and never stop the
//! loop; each pass is idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::EscrowCoordinator;

/// Default sweep interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic task expiring overdue jobs
pub struct ExpirySweeper {
    coordinator: Arc<EscrowCoordinator>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(coordinator: Arc<EscrowCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    /// Run one pass; returns the number of jobs expired
    pub async fn run_once(&self) -> usize {
        self.coordinator.ledger().sweep_used_sigs().await;

        let overdue = match self.coordinator.overdue_open_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "expiry sweep could not list jobs");
                return 0;
            }
        };

        let mut expired = 0;
        for job in overdue {
            match self.coordinator.expire_job(&job.id).await {
                Ok(_) => expired += 1,
                // Lost races and refund hiccups are retried next pass
                Err(e) => warn!(job_id = %job.id, error = %e, "expiry failed"),
            }
        }
        if expired > 0 {
            debug!(expired, "expiry sweep pass complete");
        }
        expired
    }

    /// Spawn the periodic loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EscrowLedger, EscrowSettings};
    use gigwire_chain::MockChainAdapter;
    use gigwire_service::{EventBus, JobService};
    use gigwire_store::MemoryJobStore;
    use gigwire_types::{CreateJobInput, EscrowStatus, JobStatus};

    const REQUESTER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const ESCROW: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[tokio::test]
    async fn sweep_expires_and_refunds_overdue_jobs() {
        // Jobs are created already past their deadline
        let jobs = Arc::new(JobService::new(
            Arc::new(MemoryJobStore::new()),
            EventBus::default(),
            chrono::Duration::milliseconds(-1),
        ));
        let chain = Arc::new(MockChainAdapter::new(MINT, ESCROW));
        let coordinator = Arc::new(EscrowCoordinator::new(
            chain.clone(),
            Arc::new(EscrowLedger::new()),
            jobs.clone(),
            EscrowSettings {
                escrow_wallet: ESCROW.to_string(),
                mint: MINT.to_string(),
                platform_wallet: None,
                fee_basis_points: 0,
            },
        ));

        let job = jobs
            .create(CreateJobInput {
                title: "t".to_string(),
                description: "d".to_string(),
                bounty_usdc: 0.1,
                requester_wallet: REQUESTER.to_string(),
                tags: vec![],
            })
            .await
            .unwrap();
        chain
            .register_deposit("dep_sig", REQUESTER, job.bounty_atomic)
            .await;
        coordinator
            .activate_with_deposit(&job.id, "dep_sig")
            .await
            .unwrap();

        let sweeper = ExpirySweeper::new(coordinator.clone(), DEFAULT_INTERVAL);
        assert_eq!(sweeper.run_once().await, 1);

        assert_eq!(jobs.get(&job.id).await.unwrap().status, JobStatus::Expired);
        assert_eq!(
            coordinator.ledger().get(&job.id).await.unwrap().status,
            EscrowStatus::Refunded
        );

        // A second pass finds nothing to do
        assert_eq!(sweeper.run_once().await, 0);
    }
}
