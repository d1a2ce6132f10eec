//! Sweep monitoring.
//!
//! A [`SweepMonitor`] is created once at startup, shared by `Arc` with the
//! engine and stopped at shutdown. After `stop` further samples are dropped.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Counters of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSample {
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub triggers_fired: usize,
    pub sent: usize,
    pub takeovers: usize,
    pub paused: usize,
    pub noops: usize,
    pub compliance_blocked: usize,
    pub failures: usize,
    pub deliveries_finalized: usize,
}

/// Totals since startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub sweeps: u64,
    pub triggers_fired: u64,
    pub sent: u64,
    pub takeovers: u64,
    pub paused: u64,
    pub noops: u64,
    pub compliance_blocked: u64,
    pub failures: u64,
    pub deliveries_finalized: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub slowest_sweep: Duration,
}

#[derive(Debug, Default)]
pub struct SweepMonitor {
    totals: Mutex<MonitorSnapshot>,
    stopped: AtomicBool,
}

impl SweepMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Fold one sweep into the totals and log its summary.
    pub fn record(&self, sample: &SweepSample) {
        if !self.is_running() {
            return;
        }

        info!(
            sent = sample.sent,
            takeovers = sample.takeovers,
            paused = sample.paused,
            noops = sample.noops,
            compliance_blocked = sample.compliance_blocked,
            failures = sample.failures,
            triggers = sample.triggers_fired,
            elapsed_ms = sample.elapsed.as_millis() as u64,
            "sweep completed"
        );

        let Ok(mut totals) = self.totals.lock() else {
            warn!("sweep monitor lock poisoned; sample dropped");
            return;
        };
        totals.sweeps += 1;
        totals.triggers_fired += sample.triggers_fired as u64;
        totals.sent += sample.sent as u64;
        totals.takeovers += sample.takeovers as u64;
        totals.paused += sample.paused as u64;
        totals.noops += sample.noops as u64;
        totals.compliance_blocked += sample.compliance_blocked as u64;
        totals.failures += sample.failures as u64;
        totals.deliveries_finalized += sample.deliveries_finalized as u64;
        if sample.started_at.is_some() {
            totals.last_sweep_at = sample.started_at;
        }
        totals.slowest_sweep = totals.slowest_sweep.max(sample.elapsed);
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.totals
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Stop accepting samples and log the final totals.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let totals = self.snapshot();
        info!(
            sweeps = totals.sweeps,
            sent = totals.sent,
            failures = totals.failures,
            compliance_blocked = totals.compliance_blocked,
            "sweep monitor stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_accumulate() {
        let monitor = SweepMonitor::new();
        monitor.record(&SweepSample {
            sent: 2,
            noops: 1,
            elapsed: Duration::from_millis(40),
            ..SweepSample::default()
        });
        monitor.record(&SweepSample {
            sent: 1,
            failures: 1,
            elapsed: Duration::from_millis(10),
            ..SweepSample::default()
        });

        let snap = monitor.snapshot();
        assert_eq!(snap.sweeps, 2);
        assert_eq!(snap.sent, 3);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.slowest_sweep, Duration::from_millis(40));
    }

    #[test]
    fn stopped_monitor_ignores_samples() {
        let monitor = SweepMonitor::new();
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
        monitor.record(&SweepSample {
            sent: 5,
            ..SweepSample::default()
        });
        assert_eq!(monitor.snapshot().sweeps, 0);
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_value(SweepMonitor::new().snapshot()).unwrap();
        assert_eq!(json["sweeps"], 0);
    }
}
