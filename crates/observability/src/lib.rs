//! Tracing setup and sweep monitoring (shared by every binary and test).

/// Initialize process-wide tracing.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Sweep monitoring service.
pub mod metrics;

pub use metrics::{MonitorSnapshot, SweepMonitor, SweepSample};
