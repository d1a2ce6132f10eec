//! Delivery worker: applies `FinalizeDelivery` jobs to the conversation log.
//!
//! There is exactly one consumer of the delivery queue. Each job marks its
//! message sent with the provider id and is then acknowledged; a repeated
//! job for an already-sent message is acknowledged without effect.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::store::{LeadStore, StoreError};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

#[derive(Debug, Clone)]
pub struct DeliveryWorkerConfig {
    /// How often to poll for new jobs
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for DeliveryWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "delivery-worker".to_string(),
        }
    }
}

impl DeliveryWorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Outcome counters of one [`DeliveryWorker::run_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryRun {
    pub finalized: usize,
    /// Jobs whose message was already sent with the same provider id.
    pub duplicates: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl DeliveryRun {
    pub fn processed(&self) -> usize {
        self.finalized + self.duplicates + self.retried + self.dead_lettered
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct DeliveryWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl DeliveryWorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_finalized: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

enum Applied {
    Finalized,
    Duplicate,
}

pub struct DeliveryWorker<J: JobStore, L: LeadStore> {
    jobs: Arc<J>,
    leads: Arc<L>,
}

impl<J: JobStore, L: LeadStore> Clone for DeliveryWorker<J, L> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            leads: Arc::clone(&self.leads),
        }
    }
}

impl<J, L> DeliveryWorker<J, L>
where
    J: JobStore + 'static,
    L: LeadStore + 'static,
{
    pub fn new(jobs: Arc<J>, leads: Arc<L>) -> Self {
        Self { jobs, leads }
    }

    pub fn jobs(&self) -> &Arc<J> {
        &self.jobs
    }

    /// Drain every job that is ready at `now`.
    pub fn run_pending(&self, now: DateTime<Utc>) -> Result<DeliveryRun, JobStoreError> {
        let stats = self.jobs.stats()?;
        // Bounded so a job retried with zero delay cannot spin forever.
        let budget = stats.pending + stats.failed;
        let mut run = DeliveryRun::default();

        for _ in 0..budget {
            let Some(mut job) = self.jobs.claim_next(now)? else {
                break;
            };
            match self.execute(&mut job, now)? {
                Some(Applied::Finalized) => run.finalized += 1,
                Some(Applied::Duplicate) => run.duplicates += 1,
                None if job.status.is_retriable() => run.retried += 1,
                None => run.dead_lettered += 1,
            }
        }
        Ok(run)
    }

    fn apply(&self, job: &Job) -> (JobResult, Option<Applied>) {
        match &job.kind {
            JobKind::FinalizeDelivery {
                message_id,
                provider_id,
            } => match self.leads.mark_message_sent(*message_id, provider_id) {
                Ok(true) => (JobResult::Success, Some(Applied::Finalized)),
                Ok(false) => (JobResult::Success, Some(Applied::Duplicate)),
                Err(e @ StoreError::InvalidTransition(_)) | Err(e @ StoreError::NotFound(_)) => {
                    (JobResult::Fatal(e.to_string()), None)
                }
                Err(e) => (JobResult::Failure(e.to_string()), None),
            },
        }
    }

    /// Run one claimed job and persist its new status.
    fn execute(&self, job: &mut Job, now: DateTime<Utc>) -> Result<Option<Applied>, JobStoreError> {
        let (result, applied) = self.apply(job);
        match result {
            JobResult::Success => {
                self.jobs.acknowledge(job.id, now)?;
                job.mark_completed(now);
                debug!(job_id = %job.id, kind = job.kind.type_name(), "delivery finalized");
                Ok(applied)
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), now);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %error, "delivery job dead-lettered");
                    self.jobs.dead_letter(job.clone(), error, now)?;
                } else {
                    self.jobs.update(job)?;
                }
                Ok(None)
            }
            JobResult::Fatal(error) => {
                warn!(job_id = %job.id, error = %error, "delivery job cannot be applied");
                job.status = JobStatus::DeadLettered {
                    error: error.clone(),
                    attempts: job.attempt,
                };
                self.jobs.dead_letter(job.clone(), error, now)?;
                Ok(None)
            }
        }
    }

    /// Spawn the worker in a background thread.
    pub fn spawn(self, config: DeliveryWorkerConfig) -> DeliveryWorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = Arc::clone(&stats);

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn delivery worker thread");

        DeliveryWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn worker_loop<J, L>(
    worker: DeliveryWorker<J, L>,
    config: DeliveryWorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    J: JobStore + 'static,
    L: LeadStore + 'static,
{
    info!(worker = %config.name, "delivery worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let outcome = worker.run_pending(Utc::now());
        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
            if let Ok(run) = &outcome {
                s.jobs_processed += run.processed() as u64;
                s.jobs_finalized += (run.finalized + run.duplicates) as u64;
                s.jobs_failed += run.retried as u64;
                s.jobs_dead_lettered += run.dead_lettered as u64;
            }
        }

        match outcome {
            Ok(run) if run.processed() > 0 => continue,
            Ok(_) => {}
            Err(e) => error!(worker = %config.name, error = %e, "failed to drain delivery queue"),
        }

        match shutdown_rx.recv_timeout(config.poll_interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    info!(worker = %config.name, "delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use leadflow_core::{DeliveryStatus, Lead, Message, MessageId};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn setup() -> (
        DeliveryWorker<InMemoryJobStore, InMemoryStore>,
        Arc<InMemoryStore>,
        Message,
    ) {
        let store = Arc::new(InMemoryStore::new());
        let lead = Lead::new("Ana", t0());
        store.insert_lead(lead.clone()).unwrap();
        let msg = Message::outbound_ai(lead.id, "Hi Ana", t0(), "initial_contact");
        store.append_message(msg.clone()).unwrap();
        let worker = DeliveryWorker::new(Arc::new(InMemoryJobStore::new()), store.clone());
        (worker, store, msg)
    }

    fn finalize(msg: &Message, key: Uuid) -> Job {
        Job::new(JobKind::finalize_delivery(msg.id, "SM000001"), key, t0())
    }

    #[test]
    fn finalize_marks_message_sent() {
        let (worker, store, msg) = setup();
        worker.jobs().enqueue(finalize(&msg, Uuid::now_v7())).unwrap();

        let run = worker.run_pending(t0()).unwrap();
        assert_eq!(run.finalized, 1);

        let stored = store.get_message(msg.id).unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Sent);
        assert_eq!(stored.provider_id.as_deref(), Some("SM000001"));
    }

    #[test]
    fn repeated_deliveries_have_one_effect() {
        let (worker, store, msg) = setup();
        // Distinct keys bypass queue de-duplication; the message itself
        // still changes only once.
        worker.jobs().enqueue(finalize(&msg, Uuid::now_v7())).unwrap();
        worker.jobs().enqueue(finalize(&msg, Uuid::now_v7())).unwrap();

        let run = worker.run_pending(t0()).unwrap();
        assert_eq!(run.finalized, 1);
        assert_eq!(run.duplicates, 1);
        assert_eq!(worker.jobs().stats().unwrap().completed, 2);
        assert_eq!(
            store.get_message(msg.id).unwrap().unwrap().delivery_status,
            DeliveryStatus::Sent
        );
    }

    #[test]
    fn unknown_message_is_dead_lettered() {
        let (worker, _, _) = setup();
        let job = Job::new(
            JobKind::finalize_delivery(MessageId::new(), "SM9"),
            Uuid::now_v7(),
            t0(),
        );
        worker.jobs().enqueue(job).unwrap();

        let run = worker.run_pending(t0()).unwrap();
        assert_eq!(run.dead_lettered, 1);
        assert_eq!(worker.jobs().list_dead_letters(10).unwrap().len(), 1);
    }

    #[test]
    fn spawned_worker_drains_and_stops() {
        let (worker, store, msg) = setup();
        worker.jobs().enqueue(finalize(&msg, Uuid::now_v7())).unwrap();
        let handle = worker.spawn(
            DeliveryWorkerConfig::default().with_poll_interval(Duration::from_millis(10)),
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let status = store.get_message(msg.id).unwrap().unwrap().delivery_status;
            if status == DeliveryStatus::Sent {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();
        assert_eq!(
            store.get_message(msg.id).unwrap().unwrap().delivery_status,
            DeliveryStatus::Sent
        );
    }
}
