//! Metrics module - Per-loop performance tracking

use crate::error::{ControlError, ControlResult};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// LOOP METRICS - Thread-safe iteration tracking
// ============================================================================

/// Shared handle; clones record into the same counters.
#[derive(Clone)]
pub struct LoopMetrics {
    cycle_hist: Arc<Mutex<Histogram<u64>>>,
    iterations: Arc<AtomicU64>,
    faults: Arc<AtomicU64>,
}

impl LoopMetrics {
    pub fn new() -> ControlResult<Self> {
        let hist = Histogram::new(3).map_err(|e| ControlError::Metrics {
            what: format!("{e:?}"),
        })?;
        Ok(Self {
            cycle_hist: Arc::new(Mutex::new(hist)),
            iterations: Arc::new(AtomicU64::new(0)),
            faults: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Record one completed iteration and how long it took.
    pub fn record_cycle(&self, duration: Duration) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.cycle_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let hist = self.cycle_hist.lock();

        MetricsReport {
            iterations: self.iterations(),
            faults: self.faults(),
            cycle_p50: Duration::from_nanos(hist.value_at_quantile(0.5)),
            cycle_p99: Duration::from_nanos(hist.value_at_quantile(0.99)),
            cycle_max: Duration::from_nanos(hist.max()),
        }
    }
}

// ============================================================================
// METRICS REPORT - Summary statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub iterations: u64,
    pub faults: u64,
    pub cycle_p50: Duration,
    pub cycle_p99: Duration,
    pub cycle_max: Duration,
}

impl MetricsReport {
    /// Share of attempted iterations that completed without a fault, in percent.
    pub fn health(&self) -> f64 {
        let attempts = self.iterations + self.faults;
        if attempts == 0 {
            100.0
        } else {
            (self.iterations as f64 / attempts as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_cycles_and_faults() {
        let metrics = LoopMetrics::new().unwrap();
        let shared = metrics.clone();

        metrics.record_cycle(Duration::from_micros(100));
        shared.record_cycle(Duration::from_micros(300));
        shared.record_fault();

        let report = metrics.report();
        assert_eq!(report.iterations, 2);
        assert_eq!(report.faults, 1);
        assert!(report.cycle_max >= Duration::from_micros(299));
        assert!((report.health() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_report_is_healthy() {
        let report = LoopMetrics::new().unwrap().report();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.health(), 100.0);
    }
}
