//! Job storage.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Enqueue a job. A job whose idempotency key is already known is not
    /// added again; the existing job's id is returned.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending job that is ready at `now`.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError>;

    /// Mark a running job completed.
    fn acknowledge(&self, job_id: JobId, now: DateTime<Utc>) -> Result<(), JobStoreError>;

    fn dead_letter(&self, job: Job, reason: String, now: DateTime<Utc>)
        -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending.
    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job store lock poisoned")]
    Poisoned,
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Default)]
struct Queue {
    jobs: HashMap<JobId, Job>,
    keys: HashMap<Uuid, JobId>,
    dead_letters: HashMap<JobId, DeadLetterEntry>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    queue: RwLock<Queue>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut queue = self.queue.write().map_err(|_| JobStoreError::Poisoned)?;
        if let Some(existing) = queue.keys.get(&job.idempotency_key) {
            return Ok(*existing);
        }
        let id = job.id;
        queue.keys.insert(job.idempotency_key, id);
        queue.jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let queue = self.queue.read().map_err(|_| JobStoreError::Poisoned)?;
        Ok(queue
            .jobs
            .get(&job_id)
            .or_else(|| queue.dead_letters.get(&job_id).map(|e| &e.job))
            .cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut queue = self.queue.write().map_err(|_| JobStoreError::Poisoned)?;
        let slot = queue
            .jobs
            .get_mut(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        let mut queue = self.queue.write().map_err(|_| JobStoreError::Poisoned)?;

        let next = queue
            .jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready(now)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            queue.jobs.get_mut(&id).map(|job| {
                job.mark_running(now);
                job.clone()
            })
        }))
    }

    fn acknowledge(&self, job_id: JobId, now: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut queue = self.queue.write().map_err(|_| JobStoreError::Poisoned)?;
        let job = queue
            .jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        if job.status != JobStatus::Completed {
            job.mark_completed(now);
        }
        Ok(())
    }

    fn dead_letter(
        &self,
        mut job: Job,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), JobStoreError> {
        let mut queue = self.queue.write().map_err(|_| JobStoreError::Poisoned)?;
        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = now;
        queue.jobs.remove(&job.id);
        queue
            .dead_letters
            .insert(job.id, DeadLetterEntry::new(job, reason, now));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let queue = self.queue.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut entries: Vec<_> = queue.dead_letters.values().cloned().collect();
        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        let mut queue = self.queue.write().map_err(|_| JobStoreError::Poisoned)?;
        let entry = queue
            .dead_letters
            .remove(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = now;
        job.history.clear();

        queue.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let queue = self.queue.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut stats = JobStats::default();
        for job in queue.jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += queue.dead_letters.len();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobKind;
    use chrono::TimeZone;
    use leadflow_core::MessageId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn job(key: Uuid) -> Job {
        Job::new(JobKind::finalize_delivery(MessageId::new(), "SM1"), key, t0())
    }

    #[test]
    fn enqueue_and_claim() {
        let store = InMemoryJobStore::new();
        let job_id = store.enqueue(job(Uuid::now_v7())).unwrap();

        let claimed = store.claim_next(t0()).unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);

        assert!(store.claim_next(t0()).unwrap().is_none());
    }

    #[test]
    fn duplicate_idempotency_keys_collapse() {
        let store = InMemoryJobStore::new();
        let key = Uuid::now_v7();
        let first = store.enqueue(job(key)).unwrap();
        let second = store.enqueue(job(key)).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.stats().unwrap().pending, 1);
    }

    #[test]
    fn acknowledged_jobs_are_not_claimed_again() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(job(Uuid::now_v7())).unwrap();
        store.claim_next(t0()).unwrap();
        store.acknowledge(id, t0()).unwrap();
        store.acknowledge(id, t0()).unwrap();
        assert!(store.claim_next(t0()).unwrap().is_none());
        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.history.len(), 1);
        assert_eq!(store.stats().unwrap().completed, 1);
    }

    #[test]
    fn dead_letter_flow() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(job(Uuid::now_v7())).unwrap();
        let claimed = store.claim_next(t0()).unwrap().unwrap();

        store
            .dead_letter(claimed, "message vanished".into(), t0())
            .unwrap();
        assert_eq!(store.list_dead_letters(10).unwrap().len(), 1);
        assert!(store.claim_next(t0()).unwrap().is_none());

        let retried = store.retry_dead_letter(id, t0()).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(store.list_dead_letters(10).unwrap().is_empty());
        assert!(store.claim_next(t0()).unwrap().is_some());
    }
}
