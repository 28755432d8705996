//! Closed-loop person-following core for the Rust follow-drone platform.
//!
//! The modules follow the per-tick data flow: detections and sensor snapshots
//! enter through [`interface`], are filtered by [`estimation`], turned into
//! setpoints by [`control`], translated for the flight firmware by
//! [`dispatch`], and paced by the fixed-cadence [`supervisor`].

pub mod config;
pub mod control;
pub mod diagnostics;
pub mod dispatch;
pub mod estimation;
pub mod interface;
pub mod math;
pub mod prelude;
pub mod supervisor;

pub use config::{FailsafeAction, FollowConfig};
pub use prelude::{CriticalFault, FollowError, FollowResult};
