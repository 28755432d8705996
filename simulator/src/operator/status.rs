use followcore::diagnostics::{MetricsSnapshot, OperatorAlert};
use followcore::estimation::TargetState;
use followcore::interface::{ControlCommand, FlightMode, ProtocolMessage};
use followcore::supervisor::TickReport;
use followcore::CriticalFault;
use serde::Serialize;

/// Alerts kept in the status document; older ones are dropped.
pub const MAX_STATUS_ALERTS: usize = 32;

/// JSON document served on `GET /status`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct OperatorStatus {
    pub now: f64,
    pub mode: Option<FlightMode>,
    pub failsafe_cause: Option<CriticalFault>,
    pub target: Option<TargetState>,
    pub last_command: Option<ControlCommand>,
    pub last_message: Option<ProtocolMessage>,
    pub metrics: MetricsSnapshot,
    /// Most recent alerts, oldest first.
    pub alerts: Vec<OperatorAlert>,
}

impl OperatorStatus {
    pub fn update(&mut self, report: &TickReport, alerts: Vec<OperatorAlert>) {
        self.now = report.now;
        self.mode = Some(report.mode);
        self.failsafe_cause = report.failsafe_cause;
        self.target = Some(report.target);
        self.last_command = Some(report.command);
        if report.message.is_some() {
            self.last_message = report.message.clone();
        }
        self.metrics = report.metrics;
        self.alerts.extend(alerts);
        let overflow = self.alerts.len().saturating_sub(MAX_STATUS_ALERTS);
        self.alerts.drain(..overflow);
    }
}
