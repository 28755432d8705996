pub mod bridge;
pub mod status;
