use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use leadflow_events::{EventBus, LearningEvent};

use crate::engine::{LeadEngine, SweepReport};
use crate::jobs::JobStore;
use crate::store::{AnalyticsStore, LeadStore};

/// Something the runner can sweep.
pub trait Sweep: Send + Sync + 'static {
    fn sweep(&self) -> SweepReport;
}

impl<S, J, B> Sweep for LeadEngine<S, J, B>
where
    S: LeadStore + AnalyticsStore + 'static,
    J: JobStore + 'static,
    B: EventBus<LearningEvent> + 'static,
{
    fn sweep(&self) -> SweepReport {
        self.process(Utc::now())
    }
}

/// Config for the background sweep runner.
#[derive(Debug, Clone)]
pub struct SweepRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for SweepRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl SweepRunner {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Handle for the running sweep runner (shutdown + trigger hook).
#[derive(Debug)]
pub struct SweepRunnerHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweepRunnerHandle {
    /// Ask for a sweep now, e.g. after a batch of leads was imported.
    ///
    /// Triggers are coalesced: while one is pending, further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the runner thread. A sweep in progress finishes first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl SweepRunner {
    /// Spawn the runner.
    ///
    /// - Schedule: sweeps every `interval`, and once on startup
    /// - Manual trigger: `handle.trigger()`
    /// - A sweep that hit a store-level failure is retried with bounded
    ///   exponential backoff; per-lead failures are left to the next tick
    pub fn spawn<E>(&self, engine: Arc<E>) -> SweepRunnerHandle
    where
        E: Sweep,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let cfg = self.clone();
        let join = thread::Builder::new()
            .name("sweep-runner".to_string())
            .spawn(move || runner_loop(cfg, shutdown_rx, trigger_rx, engine))
            .expect("failed to spawn sweep runner thread");

        SweepRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

fn runner_loop<E>(
    cfg: SweepRunner,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    engine: Arc<E>,
) where
    E: Sweep,
{
    info!(interval_ms = cfg.interval.as_millis() as u64, "sweep runner started");

    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = true; // sweep once on startup
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        // Shutdown has priority.
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            // Keep a stable cadence even if a sweep overran.
            while next_tick <= now {
                next_tick += cfg.interval;
            }
        }

        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }

        pending = false;

        let report = engine.sweep();
        let systemic = report.failures.iter().filter(|f| f.lead_id.is_none()).count();
        if systemic == 0 {
            failures = 0;
            continue;
        }

        warn!(systemic, "sweep hit store-level failures");
        failures += 1;
        if failures <= cfg.max_retries {
            pending = true;
            backoff_until = Some(Instant::now() + backoff(cfg.base_backoff, failures));
        } else {
            failures = 0;
        }
    }

    info!("sweep runner stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at 10s.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}
