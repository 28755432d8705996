use crate::generator::scenario::{Scenario, ScenarioKind};
use crate::generator::vehicle::SimVehicle;
use crate::operator::bridge::OperatorBridge;
use crate::workflow::config::SimulationConfig;
use crate::workflow::profile::ProfileSwitch;
use crate::workflow::world::{SharedWorld, SimWorld};
use anyhow::Context;
use followcore::diagnostics::{MetricsSnapshot, OperatorAlert};
use followcore::interface::FlightMode;
use followcore::supervisor::{
    channels, Clock, InputPublishers, ManualClock, MonotonicClock, Supervisor,
};
use followcore::CriticalFault;
use log::{info, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub struct RunSummary {
    pub ticks: usize,
    /// Ticks spent in each mode, keyed by mode name.
    pub mode_ticks: BTreeMap<&'static str, usize>,
    pub final_mode: FlightMode,
    pub failsafe_cause: Option<CriticalFault>,
    pub final_range: f32,
    pub messages_sent: usize,
    pub metrics: MetricsSnapshot,
    pub alerts: Vec<OperatorAlert>,
    /// Simulated time at which the mission restarted with a new profile.
    pub restarted_at: Option<f64>,
}

impl RunSummary {
    #[cfg(test)]
    pub fn visited(&self, mode: FlightMode) -> bool {
        self.mode_ticks.contains_key(mode.name())
    }
}

#[derive(Clone)]
pub struct Runner {
    config: SimulationConfig,
}

impl Runner {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Replaces the configured profile switch.
    pub fn with_profile_switch(mut self, switch: ProfileSwitch) -> Self {
        self.config.profile_switch = Some(switch);
        self
    }

    fn restart_with<C: Clock>(
        &self,
        supervisor: &mut Supervisor<C>,
        switch: ProfileSwitch,
    ) -> anyhow::Result<()> {
        let follow = switch.profile.apply(&self.config.mission.follow);
        info!(
            "switching to {:?} profile ({:.1} m)",
            switch.profile, follow.target_distance
        );
        supervisor
            .restart_mission(follow)
            .with_context(|| format!("restarting mission with {:?} profile", switch.profile))
    }

    fn build_world(&self, kind: ScenarioKind) -> anyhow::Result<SimWorld> {
        let scenario = Scenario::new(
            self.config.scenario.clone().with_kind(kind),
            self.config.mission.camera.clone(),
        )?;
        let vehicle = SimVehicle::new(self.config.vehicle.clone());
        Ok(SimWorld::new(
            scenario,
            vehicle,
            self.config.mission.obstacles.sector_count,
        ))
    }

    /// Deterministic run on a manual clock: every tick observes the world,
    /// runs the supervisor and flies the resulting message.
    pub fn execute(&self, kind: ScenarioKind, ticks: usize) -> anyhow::Result<RunSummary> {
        let dt = self.config.mission.supervisor.tick_interval;
        let clock = ManualClock::new(0.0);
        let (publishers, slots) = channels();
        let mut supervisor = Supervisor::new(self.config.mission.clone(), slots, clock.clone())
            .context("building supervisor")?;
        let mut world = self.build_world(kind)?;

        let mut mode_ticks = BTreeMap::new();
        let mut messages_sent = 0;
        let mut last = None;
        let mut pending_switch = self.config.profile_switch;
        let mut restarted_at = None;
        for _ in 0..ticks {
            if let Some(switch) = pending_switch.filter(|switch| clock.now() >= switch.at) {
                self.restart_with(&mut supervisor, switch)?;
                restarted_at = Some(clock.now());
                pending_switch = None;
            }
            publish_observation(&publishers, &mut world, clock.now());
            let report = supervisor.tick_into(&mut world);
            if report.message.is_some() {
                messages_sent += 1;
            }
            *mode_ticks.entry(report.mode.name()).or_insert(0) += 1;
            world.advance(dt as f32);
            clock.advance(dt);
            last = Some(report);
        }

        let last = last.context("scenario ran zero ticks")?;
        Ok(RunSummary {
            ticks,
            mode_ticks,
            final_mode: last.mode,
            failsafe_cause: last.failsafe_cause,
            final_range: last.target.estimated_range,
            messages_sent,
            metrics: last.metrics,
            alerts: supervisor.log().drain_alerts(),
            restarted_at,
        })
    }

    /// Real-time run: the world advances on its own task, the supervisor
    /// runs on the monotonic clock and the operator bridge serves status
    /// and abort until Ctrl+C.
    pub async fn serve(&self, kind: ScenarioKind, address: SocketAddr) -> anyhow::Result<u64> {
        let dt = self.config.mission.supervisor.tick_interval;
        let clock = MonotonicClock::new();
        let (publishers, slots) = channels();
        let publishers = Arc::new(publishers);
        let mut supervisor = Supervisor::new(self.config.mission.clone(), slots, clock.clone())
            .context("building supervisor")?;
        let world = Arc::new(Mutex::new(self.build_world(kind)?));
        if let Some(switch) = self.config.profile_switch {
            // Live sessions have no simulated timeline; the profile applies
            // from the start.
            self.restart_with(&mut supervisor, switch)?;
        }

        let bridge = Arc::new(OperatorBridge::new(Arc::clone(&publishers)));
        bridge.spawn(address);

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {}", err);
            }
            let _ = stop_tx.send(true);
        });

        let producer_world = Arc::clone(&world);
        let producer_publishers = Arc::clone(&publishers);
        let producer_clock = clock.clone();
        let mut producer_stop = stop_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs_f64(dt));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = producer_stop.changed() => break,
                }
                let Ok(mut world) = producer_world.lock() else {
                    break;
                };
                world.advance(dt as f32);
                publish_observation(&producer_publishers, &mut world, producer_clock.now());
            }
        });

        let mut reports = supervisor.subscribe();
        let log = supervisor.log();
        let status_bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            while reports.changed().await.is_ok() {
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    status_bridge.publish(&report, log.drain_alerts());
                }
            }
        });

        let mut link = SharedWorld(world);
        let ticks = supervisor.run(&mut link, stop_rx).await?;
        info!("live session finished after {} ticks", ticks);
        Ok(ticks)
    }
}

fn publish_observation(publishers: &InputPublishers, world: &mut SimWorld, now: f64) {
    let observation = world.observe(now);
    publishers.publish_telemetry(observation.telemetry);
    publishers.publish_detection(observation.detection);
    publishers.publish_obstacles(observation.obstacles);
}
