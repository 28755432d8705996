use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::FollowConfig;
use crate::control::{ControlInputs, FollowController};
use crate::diagnostics::{LogManager, MetricsRecorder, MetricsSnapshot};
use crate::dispatch::{CommandDispatcher, DispatchConfig};
use crate::estimation::{
    CameraModel, DistanceBearingModel, EstimatorConfig, ObstacleMap, ObstacleMapConfig,
    TargetEstimator, TargetState,
};
use crate::interface::{ControlCommand, FlightMode, ProtocolMessage, Telemetry};
use crate::prelude::{CommandSink, CriticalFault, FollowError, FollowResult};
use crate::supervisor::clock::{Clock, MonotonicClock};
use crate::supervisor::slots::InputSlots;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between ticks.
    pub tick_interval: f64,
    /// Longest a tick may run before it counts as missed.
    pub tick_budget: f64,
    /// Consecutive missed or rejected ticks that escalate to FAILSAFE.
    pub max_consecutive_faults: u32,
}

impl SupervisorConfig {
    pub fn validate(&self) -> FollowResult<()> {
        if !self.tick_interval.is_finite() || self.tick_interval <= 0.0 {
            return Err(FollowError::InvalidConfig(
                "tick_interval must be positive".into(),
            ));
        }
        if !self.tick_budget.is_finite() || self.tick_budget <= 0.0 {
            return Err(FollowError::InvalidConfig(
                "tick_budget must be positive".into(),
            ));
        }
        if self.max_consecutive_faults == 0 {
            return Err(FollowError::InvalidConfig(
                "max_consecutive_faults must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to start a follow session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    pub follow: FollowConfig,
    pub estimator: EstimatorConfig,
    pub camera: CameraModel,
    pub obstacles: ObstacleMapConfig,
    pub dispatch: DispatchConfig,
    pub supervisor: SupervisorConfig,
}

impl MissionConfig {
    pub fn validate(&self) -> FollowResult<()> {
        self.follow.validate()?;
        self.estimator.validate()?;
        self.camera.validate()?;
        self.obstacles.validate()?;
        self.dispatch.validate()?;
        self.supervisor.validate()
    }
}

/// What happened to the command of one tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum TickOutcome {
    Sent,
    Throttled,
    Rejected(String),
    /// Tick overran its budget; nothing was dispatched.
    Missed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub now: f64,
    pub mode: FlightMode,
    pub failsafe_cause: Option<CriticalFault>,
    pub target: TargetState,
    pub command: ControlCommand,
    pub message: Option<ProtocolMessage>,
    pub outcome: TickOutcome,
    pub metrics: MetricsSnapshot,
}

/// Fixed-cadence owner of the per-tick pipeline: input slots, estimator,
/// obstacle map, controller and dispatcher.
pub struct Supervisor<C: Clock = MonotonicClock> {
    config: SupervisorConfig,
    clock: C,
    slots: InputSlots,
    estimator: TargetEstimator,
    obstacles: ObstacleMap,
    controller: FollowController,
    dispatcher: CommandDispatcher,
    last_telemetry: Option<Telemetry>,
    consecutive_faults: u32,
    log: Arc<LogManager>,
    metrics: Arc<MetricsRecorder>,
    reports: watch::Sender<Option<TickReport>>,
}

impl<C: Clock> Supervisor<C> {
    pub fn new(mission: MissionConfig, slots: InputSlots, clock: C) -> FollowResult<Self> {
        mission.validate()?;
        let model = DistanceBearingModel::new(mission.camera)?;
        let estimator = TargetEstimator::new(
            mission.estimator,
            model,
            mission.follow.target_loss_timeout,
        );
        let obstacles = ObstacleMap::new(mission.obstacles)?;
        let dispatcher = CommandDispatcher::new(mission.dispatch, &mission.follow)?;
        let controller = FollowController::new(mission.follow)?;
        let (reports, _) = watch::channel(None);

        Ok(Self {
            config: mission.supervisor,
            clock,
            slots,
            estimator,
            obstacles,
            controller,
            dispatcher,
            last_telemetry: None,
            consecutive_faults: 0,
            log: Arc::new(LogManager::default()),
            metrics: Arc::new(MetricsRecorder::new()),
            reports,
        })
    }

    pub fn controller(&self) -> &FollowController {
        &self.controller
    }

    pub fn log(&self) -> Arc<LogManager> {
        Arc::clone(&self.log)
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    /// Latest tick report, updated at the end of every tick.
    pub fn subscribe(&self) -> watch::Receiver<Option<TickReport>> {
        self.reports.subscribe()
    }

    /// Starts a new mission: clears the target, obstacle map, mode, fault
    /// counters and any input published before the restart.
    pub fn restart_mission(&mut self, follow: FollowConfig) -> FollowResult<()> {
        self.controller.reset(follow.clone())?;
        self.estimator.reset(follow.target_loss_timeout);
        self.obstacles.clear();
        self.dispatcher.reset(&follow);
        self.slots.discard();
        self.last_telemetry = None;
        self.consecutive_faults = 0;
        self.metrics.reset();
        self.log.record(
            self.clock.now(),
            &format!("mission restarted, following at {:.1} m", follow.target_distance),
        );
        Ok(())
    }

    /// Runs one complete sense, estimate, control, dispatch cycle. The
    /// message, if any, is left in the report for the caller to deliver.
    pub fn tick(&mut self) -> TickReport {
        self.cycle(|_| Ok(()))
    }

    /// Like [`tick`](Self::tick), but hands the message to `sink` before the
    /// fault accounting of the tick, so a refused message counts as a
    /// rejected tick.
    pub fn tick_into<S: CommandSink>(&mut self, sink: &mut S) -> TickReport {
        self.cycle(|message| sink.send(message))
    }

    fn cycle<F>(&mut self, mut deliver: F) -> TickReport
    where
        F: FnMut(&ProtocolMessage) -> FollowResult<()>,
    {
        let now = self.clock.now();
        let inputs = self.slots.take();
        self.metrics.record_tick();

        let target = self.estimator.update(inputs.detection.as_ref(), now);
        for reading in inputs.obstacles {
            if let Err(err) = self.obstacles.ingest(reading) {
                self.log.alert(now, &err.to_string());
            }
        }
        self.obstacles.expire(now);

        let was_failsafe = self.controller.mode() == FlightMode::Failsafe;
        let mut command = self.controller.step(ControlInputs {
            target: &target,
            telemetry: inputs.telemetry.as_ref(),
            obstacles: &self.obstacles,
            abort: inputs.abort,
            now,
        });
        if inputs.telemetry.is_some() {
            self.last_telemetry = inputs.telemetry;
        }

        let elapsed = self.clock.now() - now;
        let (message, outcome) = if elapsed > self.config.tick_budget {
            warn!(
                "tick at {:.3} overran its budget ({:.3} s > {:.3} s)",
                now, elapsed, self.config.tick_budget
            );
            self.metrics.record_missed();
            (None, TickOutcome::Missed)
        } else {
            self.dispatch(&command)
        };
        let outcome = match (&message, outcome) {
            (Some(sent), TickOutcome::Sent) => match deliver(sent) {
                Ok(()) => TickOutcome::Sent,
                Err(err) => {
                    warn!("firmware link refused message: {}", err);
                    self.metrics.record_rejected();
                    TickOutcome::Rejected(err.to_string())
                }
            },
            (_, outcome) => outcome,
        };

        let (message, outcome) = match outcome {
            TickOutcome::Sent | TickOutcome::Throttled => {
                self.consecutive_faults = 0;
                (message, outcome)
            }
            TickOutcome::Rejected(_) | TickOutcome::Missed => {
                self.consecutive_faults += 1;
                if self.consecutive_faults >= self.config.max_consecutive_faults
                    && self.controller.mode() != FlightMode::Failsafe
                {
                    let fault = CriticalFault::ConsecutiveFaults {
                        count: self.consecutive_faults,
                    };
                    command = self.controller.force_failsafe(fault, now);
                    let (escalated, _) = self.dispatch(&command);
                    if let Some(mode_change) = &escalated {
                        if let Err(err) = deliver(mode_change) {
                            error!("firmware link refused failsafe mode change: {}", err);
                        }
                    }
                    (escalated, outcome)
                } else {
                    (message, outcome)
                }
            }
        };

        if !was_failsafe && self.controller.mode() == FlightMode::Failsafe {
            self.metrics.record_failsafe();
            let cause = self
                .controller
                .failsafe_cause()
                .map(|fault| fault.to_string())
                .unwrap_or_default();
            self.log.alert(now, &format!("FAILSAFE: {}", cause));
        }

        let report = TickReport {
            now,
            mode: self.controller.mode(),
            failsafe_cause: self.controller.failsafe_cause(),
            target,
            command,
            message,
            outcome,
            metrics: self.metrics.snapshot(),
        };
        self.reports.send_replace(Some(report.clone()));
        report
    }

    fn dispatch(&mut self, command: &ControlCommand) -> (Option<ProtocolMessage>, TickOutcome) {
        let now = self.clock.now();
        match self
            .dispatcher
            .dispatch(command, self.last_telemetry.as_ref(), now)
        {
            Ok(Some(message)) => (Some(message), TickOutcome::Sent),
            Ok(None) => {
                self.metrics.record_throttled();
                (None, TickOutcome::Throttled)
            }
            Err(err) => {
                self.metrics.record_rejected();
                (None, TickOutcome::Rejected(err.to_string()))
            }
        }
    }

    /// Ticks at the configured cadence, forwarding every message to `sink`,
    /// until `stop` turns true or its sender is dropped. Returns the number
    /// of ticks run.
    pub async fn run<S: CommandSink>(
        &mut self,
        sink: &mut S,
        mut stop: watch::Receiver<bool>,
    ) -> FollowResult<u64> {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(self.config.tick_interval));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0;

        info!(
            "supervisor running at {:.1} Hz",
            1.0 / self.config.tick_interval
        );
        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let report = self.tick_into(sink);
            ticks += 1;
            debug!("tick {} finished in mode {}", ticks, report.mode.name());
        }
        info!("supervisor stopped after {} ticks", ticks);
        Ok(ticks)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::mission;
    use super::*;
    use crate::control::fixtures::telemetry;
    use crate::estimation::obstacle::fixtures::reading;
    use crate::interface::{Detection, FirmwareMode};
    use crate::supervisor::clock::ManualClock;
    use crate::supervisor::slots::{channels, InputPublishers};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that moves forward by a fixed step on every read, simulating a
    /// slow tick.
    struct SteppingClock {
        bits: AtomicU64,
        step: f64,
    }

    impl SteppingClock {
        fn new(step: f64) -> Self {
            Self {
                bits: AtomicU64::new(0f64.to_bits()),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> f64 {
            let now = f64::from_bits(self.bits.load(Ordering::SeqCst));
            self.bits.store((now + self.step).to_bits(), Ordering::SeqCst);
            now
        }
    }

    fn supervisor<C: Clock>(mission: MissionConfig, clock: C) -> (Supervisor<C>, InputPublishers) {
        let (publishers, slots) = channels();
        (Supervisor::new(mission, slots, clock).unwrap(), publishers)
    }

    fn publish_person(supervisor: &Supervisor<ManualClock>, publishers: &InputPublishers, now: f64) {
        let bbox = supervisor.estimator.model().project(5.0, 0.0);
        publishers.publish_detection(Some(Detection::new(bbox, 0.9, now)));
    }

    #[test]
    fn visible_person_is_tracked_and_commanded() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock.clone());

        let mut report = None;
        for _ in 0..10 {
            publishers.publish_telemetry(telemetry());
            publish_person(&supervisor, &publishers, clock.now());
            report = Some(supervisor.tick());
            clock.advance(0.1);
        }

        let report = report.unwrap();
        assert_eq!(report.mode, FlightMode::Tracking);
        assert_eq!(report.outcome, TickOutcome::Sent);
        match report.message {
            Some(ProtocolMessage::Velocity(setpoint)) => assert!(setpoint.vx > 0.0),
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(supervisor.metrics().snapshot().ticks, 10);
    }

    #[test]
    fn telemetry_missing_two_ticks_lands() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock.clone());

        publishers.publish_telemetry(telemetry());
        assert_eq!(supervisor.tick().outcome, TickOutcome::Sent);
        clock.advance(0.1);
        assert_eq!(supervisor.tick().mode, FlightMode::Searching);
        clock.advance(0.1);

        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Failsafe);
        assert!(matches!(
            report.message,
            Some(ProtocolMessage::SetMode {
                mode: FirmwareMode::Land,
                ..
            })
        ));
        let alerts = supervisor.log().drain_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("telemetry"));
    }

    #[test]
    fn three_overrunning_ticks_escalate_to_failsafe() {
        let (mut supervisor, publishers) = supervisor(mission(), SteppingClock::new(0.2));

        for _ in 0..2 {
            publishers.publish_telemetry(telemetry());
            let report = supervisor.tick();
            assert_eq!(report.outcome, TickOutcome::Missed);
            assert_ne!(report.mode, FlightMode::Failsafe);
        }
        publishers.publish_telemetry(telemetry());
        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Failsafe);
        assert_eq!(
            report.failsafe_cause,
            Some(CriticalFault::ConsecutiveFaults { count: 3 })
        );
        assert!(matches!(report.message, Some(ProtocolMessage::SetMode { .. })));

        let metrics = supervisor.metrics().snapshot();
        assert_eq!(metrics.missed_ticks, 3);
        assert_eq!(metrics.failsafe_entries, 1);
    }

    #[test]
    fn stale_commands_are_rejected_and_escalate() {
        let mut mission = mission();
        mission.supervisor.tick_budget = 1.0;
        let (mut supervisor, publishers) = supervisor(mission, SteppingClock::new(0.1));

        for _ in 0..2 {
            publishers.publish_telemetry(telemetry());
            assert!(matches!(supervisor.tick().outcome, TickOutcome::Rejected(_)));
        }
        publishers.publish_telemetry(telemetry());
        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Failsafe);
        assert_eq!(supervisor.metrics().snapshot().rejected_commands, 3);
    }

    /// Firmware link that refuses everything. Each attempt moves the clock
    /// one tick forward and republishes telemetry for the next tick.
    struct RefusingLink {
        clock: ManualClock,
        publishers: InputPublishers,
        attempts: Vec<ProtocolMessage>,
    }

    impl CommandSink for RefusingLink {
        fn send(&mut self, message: &ProtocolMessage) -> FollowResult<()> {
            self.attempts.push(message.clone());
            self.clock.advance(0.1);
            self.publishers.publish_telemetry(telemetry());
            Err(FollowError::ProtocolRejection("link down".into()))
        }
    }

    #[test]
    fn refused_messages_escalate_to_failsafe() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock.clone());
        publishers.publish_telemetry(telemetry());
        let mut link = RefusingLink {
            clock,
            publishers,
            attempts: Vec::new(),
        };

        for _ in 0..2 {
            let report = supervisor.tick_into(&mut link);
            assert!(matches!(report.outcome, TickOutcome::Rejected(_)));
            assert_eq!(report.mode, FlightMode::Searching);
        }
        let report = supervisor.tick_into(&mut link);
        assert_eq!(
            report.failsafe_cause,
            Some(CriticalFault::ConsecutiveFaults { count: 3 })
        );
        assert!(matches!(
            link.attempts.last(),
            Some(ProtocolMessage::SetMode { mode: FirmwareMode::Land, .. })
        ));
        assert_eq!(supervisor.metrics().snapshot().rejected_commands, 3);
    }

    #[tokio::test]
    async fn run_escalates_when_the_link_keeps_refusing() {
        let mut mission = mission();
        mission.supervisor.tick_interval = 0.01;
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission, clock.clone());
        publishers.publish_telemetry(telemetry());
        let mut link = RefusingLink {
            clock,
            publishers,
            attempts: Vec::new(),
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let _ = stop_tx.send(true);
        });

        let ticks = supervisor.run(&mut link, stop_rx).await.unwrap();

        assert!(ticks >= 3);
        assert_eq!(supervisor.controller().mode(), FlightMode::Failsafe);
        assert_eq!(
            supervisor.controller().failsafe_cause(),
            Some(CriticalFault::ConsecutiveFaults { count: 3 })
        );
        assert_eq!(supervisor.metrics().snapshot().failsafe_entries, 1);
    }

    #[test]
    fn mission_validation_covers_camera_and_obstacles() {
        mission().validate().unwrap();

        let mut blind = mission();
        blind.camera.horizontal_fov = 0.0;
        assert!(matches!(blind.validate(), Err(FollowError::InvalidConfig(_))));

        let mut no_sectors = mission();
        no_sectors.obstacles.sector_count = 0;
        assert!(matches!(no_sectors.validate(), Err(FollowError::InvalidConfig(_))));
    }

    #[test]
    fn abort_signal_forces_failsafe_at_next_tick() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock.clone());
        publishers.publish_telemetry(telemetry());
        supervisor.tick();
        clock.advance(0.1);

        publishers.publish_telemetry(telemetry());
        publishers.raise_abort();
        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Failsafe);
        assert_eq!(report.failsafe_cause, Some(CriticalFault::Abort));
        assert!(report.message.is_some());
    }

    #[test]
    fn restart_clears_failsafe_and_state() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock.clone());
        publishers.publish_telemetry(telemetry());
        publishers.raise_abort();
        assert_eq!(supervisor.tick().mode, FlightMode::Failsafe);

        publishers.clear_abort();
        supervisor.restart_mission(mission().follow).unwrap();
        clock.advance(0.1);
        publishers.publish_telemetry(telemetry());
        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Searching);
        assert_eq!(report.outcome, TickOutcome::Sent);
        assert_eq!(report.metrics.failsafe_entries, 0);
    }

    #[test]
    fn malformed_obstacle_reading_raises_alert_without_failsafe() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock);
        publishers.publish_telemetry(telemetry());
        publishers.publish_obstacles(vec![reading(42, 1.0, 0.0)]);
        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Searching);
        assert_eq!(supervisor.log().pending_alerts(), 1);
    }

    #[test]
    fn reports_are_published_to_subscribers() {
        let clock = ManualClock::new(0.0);
        let (mut supervisor, publishers) = supervisor(mission(), clock);
        let status = supervisor.subscribe();
        publishers.publish_telemetry(telemetry());
        supervisor.tick();
        assert_eq!(
            status.borrow().as_ref().map(|report| report.mode),
            Some(FlightMode::Searching)
        );
    }

    #[tokio::test]
    async fn run_forwards_messages_until_stopped() {
        let mut mission = mission();
        mission.supervisor.tick_interval = 0.01;
        let (mut supervisor, _publishers) = supervisor(mission, ManualClock::new(0.0));
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop_tx.send(true);
        });

        let mut sink: Vec<ProtocolMessage> = Vec::new();
        let ticks = supervisor.run(&mut sink, stop_rx).await.unwrap();

        assert!(ticks >= 2);
        // No telemetry ever arrives, so the second tick lands the vehicle.
        assert!(matches!(
            sink.first(),
            Some(ProtocolMessage::SetMode {
                mode: FirmwareMode::Land,
                ..
            })
        ));
    }
}
