//! Lifecycle events published to the event bus
//!
//! Events are fire-and-forget notifications for the WebSocket hub and
//! other subscribers; clients reconcile authoritative state by polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Job;

/// Event type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventKind {
    #[serde(rename = "job.new")]
    JobNew,
    #[serde(rename = "job.claimed")]
    JobClaimed,
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.paid")]
    JobPaid,
}

/// A lifecycle event: `{type, data, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: JobEventKind,
    pub data: Job,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: Job) -> Self {
        Self {
            kind,
            data: job,
            timestamp: Utc::now(),
        }
    }

    /// Short description for logging
    pub fn summary(&self) -> String {
        let label = match self.kind {
            JobEventKind::JobNew => "new",
            JobEventKind::JobClaimed => "claimed",
            JobEventKind::JobCompleted => "completed",
            JobEventKind::JobPaid => "paid",
        };
        format!("{} {}", self.data.id, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CreateJobInput;

    #[test]
    fn event_serializes_with_dotted_type() {
        let job = Job::create(
            CreateJobInput {
                title: "t".to_string(),
                description: "d".to_string(),
                bounty_usdc: 1.0,
                requester_wallet: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
                tags: vec![],
            },
            chrono::Duration::hours(24),
        )
        .unwrap();

        let event = JobEvent::new(JobEventKind::JobClaimed, job);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job.claimed");
        assert!(json.get("data").is_some());
        assert!(json.get("timestamp").is_some());
    }
}
