use log::{error, info};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Fault surfaced to the operator interface.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperatorAlert {
    pub timestamp: f64,
    pub message: String,
}

/// Routes records to the `log` facade and keeps the most recent operator
/// alerts until the operator interface drains them.
pub struct LogManager {
    alerts: Mutex<VecDeque<OperatorAlert>>,
    capacity: usize,
}

impl LogManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Session event worth a line in the log but not an operator alert.
    pub fn record(&self, timestamp: f64, message: &str) {
        info!("{:.3}: {}", timestamp, message);
    }

    /// Logs at error level and queues the alert, evicting the oldest one when
    /// the queue is full.
    pub fn alert(&self, timestamp: f64, message: &str) {
        error!("operator alert at {:.3}: {}", timestamp, message);
        if let Ok(mut alerts) = self.alerts.lock() {
            if alerts.len() >= self.capacity {
                alerts.pop_front();
            }
            alerts.push_back(OperatorAlert {
                timestamp,
                message: message.to_string(),
            });
        }
    }

    pub fn drain_alerts(&self) -> Vec<OperatorAlert> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.drain(..).collect()
        } else {
            Vec::new()
        }
    }

    pub fn pending_alerts(&self) -> usize {
        self.alerts.lock().map(|alerts| alerts.len()).unwrap_or(0)
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(32)
    }
}
