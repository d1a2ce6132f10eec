//! Delivery jobs, their lifecycle and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadflow_core::MessageId;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind for routing to the right handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// The gateway accepted a message; record the provider id and mark it sent.
    FinalizeDelivery {
        message_id: MessageId,
        provider_id: String,
    },
}

impl JobKind {
    pub fn finalize_delivery(message_id: MessageId, provider_id: impl Into<String>) -> Self {
        Self::FinalizeDelivery {
            message_id,
            provider_id: provider_id.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JobKind::FinalizeDelivery { .. } => "finalize_delivery",
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    /// Claimed by the delivery worker.
    Running,
    Completed,
    /// Waiting for `scheduled_at` before the next attempt.
    Failed { error: String, attempt: u32 },
    /// Out of attempts, or the message it points at is gone.
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }
}

/// How a failed finalization is retried.
///
/// Delays double from `base_delay` up to `max_delay`, without jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before the job is dead-lettered (0 = never retry).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A background job.
///
/// `idempotency_key` identifies the effect, not the job: enqueueing a second
/// job with the same key is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub idempotency_key: Uuid,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Current attempt number (starts at 0)
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time of the next attempt
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, idempotency_key: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            idempotency_key,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| now >= at)
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at: now,
            success: true,
            error: None,
        });
    }

    /// Record a failed attempt; schedules a retry or dead-letters the job.
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at: now,
            success: false,
            error: Some(error.clone()),
        });

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }
}

/// Result of a handler run.
#[derive(Debug)]
pub enum JobResult {
    Success,
    /// Transient failure; retried per the job's policy.
    Failure(String),
    /// Permanent failure; dead-lettered without further attempts.
    Fatal(String),
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            job,
            dead_lettered_at: now,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn job() -> Job {
        Job::new(
            JobKind::finalize_delivery(MessageId::new(), "SM1"),
            Uuid::now_v7(),
            t0(),
        )
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(300));
    }

    #[test]
    fn failures_retry_then_dead_letter() {
        let mut job = job().with_retry_policy(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
        });

        job.mark_running(t0());
        job.mark_failed("store busy".into(), t0());
        assert!(job.status.is_retriable());
        assert!(!job.is_ready(t0()));
        assert!(job.is_ready(t0() + chrono::Duration::seconds(1)));

        job.mark_running(t0());
        job.mark_failed("store busy".into(), t0());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 2, .. }));
        assert_eq!(job.history.len(), 2);
    }

    #[test]
    fn no_retry_dead_letters_on_first_failure() {
        let mut job = job().with_retry_policy(RetryPolicy::no_retry());
        job.mark_running(t0());
        job.mark_failed("message vanished".into(), t0());
        assert!(job.status.is_terminal());
        assert_eq!(job.scheduled_at, None);
    }

    #[test]
    fn kind_serializes_with_tag() {
        let json = serde_json::to_value(&job().kind).unwrap();
        assert_eq!(json["kind"], "finalize_delivery");
        assert_eq!(json["provider_id"], "SM1");
    }
}
