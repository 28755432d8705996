use serde::Serialize;
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

/// Counters accumulated since the start of the session.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: usize,
    pub missed_ticks: usize,
    pub rejected_commands: usize,
    pub throttled_commands: usize,
    pub failsafe_entries: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_tick(&self) {
        self.update(|m| m.ticks += 1);
    }

    pub fn record_missed(&self) {
        self.update(|m| m.missed_ticks += 1);
    }

    pub fn record_rejected(&self) {
        self.update(|m| m.rejected_commands += 1);
    }

    pub fn record_throttled(&self) {
        self.update(|m| m.throttled_commands += 1);
    }

    pub fn record_failsafe(&self) {
        self.update(|m| m.failsafe_entries += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }

    pub fn reset(&self) {
        self.update(|m| *m = MetricsSnapshot::default());
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
