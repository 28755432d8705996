use anyhow::Context;
use followcore::supervisor::MissionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::generator::scenario::ScenarioConfig;
use crate::generator::vehicle::VehicleConfig;
use crate::workflow::profile::ProfileSwitch;

const SAMPLE_MISSION: &str = include_str!("../../configs/mission.yaml");

/// Mission, synthetic world and vehicle settings for one simulator run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub mission: MissionConfig,
    pub scenario: ScenarioConfig,
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub profile_switch: Option<ProfileSwitch>,
}

impl SimulationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading mission config {}", path_ref.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("parsing mission config {}", path_ref.display()))
    }

    /// The mission shipped in `configs/mission.yaml`.
    pub fn sample() -> anyhow::Result<Self> {
        Self::parse(SAMPLE_MISSION).context("parsing bundled sample mission")
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: SimulationConfig = serde_yaml::from_str(contents)?;
        config.mission.validate()?;
        if let Some(switch) = &config.profile_switch {
            if !switch.at.is_finite() || switch.at < 0.0 {
                anyhow::bail!("profile_switch.at must be a non-negative time");
            }
        }
        Ok(config)
    }
}
