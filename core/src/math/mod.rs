pub mod angle;
pub mod filter;
pub mod frames;

pub use angle::{clamp_symmetric, wrap_angle};
pub use filter::ExpSmoother;
pub use frames::{body_to_ned, clamp_norm, ned_to_body};
