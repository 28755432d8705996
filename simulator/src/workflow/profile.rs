use clap::ValueEnum;
use followcore::FollowConfig;
use serde::{Deserialize, Serialize};

/// Preset follow distances. Each carries the altitude, speed cap and
/// distance deadband that suit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FollowProfile {
    /// 3 m behind, low and slow.
    Close,
    /// 5 m behind.
    Medium,
    /// 10 m behind.
    Far,
    /// 20 m behind, high and fast.
    VeryFar,
}

struct ProfileSettings {
    target_distance: f32,
    altitude: f32,
    distance_tolerance: f32,
    max_speed: f32,
}

impl FollowProfile {
    /// Closest profile that still keeps `distance` metres from the person.
    pub fn for_distance(distance: f32) -> Self {
        if distance <= 3.0 {
            FollowProfile::Close
        } else if distance <= 5.0 {
            FollowProfile::Medium
        } else if distance <= 10.0 {
            FollowProfile::Far
        } else {
            FollowProfile::VeryFar
        }
    }

    fn settings(self) -> ProfileSettings {
        let (target_distance, altitude, distance_tolerance, max_speed) = match self {
            FollowProfile::Close => (3.0, 2.5, 0.3, 1.5),
            FollowProfile::Medium => (5.0, 3.0, 0.5, 2.0),
            FollowProfile::Far => (10.0, 4.0, 1.0, 3.0),
            FollowProfile::VeryFar => (20.0, 8.0, 2.0, 5.0),
        };
        ProfileSettings {
            target_distance,
            altitude,
            distance_tolerance,
            max_speed,
        }
    }

    /// `base` with this profile's distance, altitude, deadband and speed cap.
    /// Gains, timeouts and failsafe settings are kept.
    pub fn apply(self, base: &FollowConfig) -> FollowConfig {
        let settings = self.settings();
        FollowConfig {
            target_distance: settings.target_distance,
            distance_tolerance: settings.distance_tolerance,
            max_speed: settings.max_speed,
            avoidance_speed: base.avoidance_speed.min(settings.max_speed),
            target_altitude: Some(settings.altitude),
            ..base.clone()
        }
    }
}

/// Mission restart with a new profile partway through a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfileSwitch {
    /// Simulated time of the restart in seconds.
    pub at: f64,
    pub profile: FollowProfile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::SimulationConfig;

    #[test]
    fn distance_picks_the_covering_profile() {
        assert_eq!(FollowProfile::for_distance(2.0), FollowProfile::Close);
        assert_eq!(FollowProfile::for_distance(3.0), FollowProfile::Close);
        assert_eq!(FollowProfile::for_distance(4.2), FollowProfile::Medium);
        assert_eq!(FollowProfile::for_distance(10.0), FollowProfile::Far);
        assert_eq!(FollowProfile::for_distance(35.0), FollowProfile::VeryFar);
    }

    #[test]
    fn profile_overrides_distance_settings_only() {
        let base = SimulationConfig::sample().unwrap().mission.follow;
        let far = FollowProfile::Far.apply(&base);
        assert_eq!(far.target_distance, 10.0);
        assert_eq!(far.distance_tolerance, 1.0);
        assert_eq!(far.max_speed, 3.0);
        assert_eq!(far.target_altitude, Some(4.0));
        assert_eq!(far.holding_timeout, base.holding_timeout);
        assert_eq!(far.failsafe_action, base.failsafe_action);
        far.validate().unwrap();

        for profile in FollowProfile::value_variants() {
            profile.apply(&base).validate().unwrap();
        }
    }

    #[test]
    fn profile_names_parse_from_yaml() {
        let switch: ProfileSwitch = serde_yaml::from_str("at: 12.5\nprofile: very_far\n").unwrap();
        assert_eq!(switch.profile, FollowProfile::VeryFar);
        assert_eq!(switch.at, 12.5);
    }
}
