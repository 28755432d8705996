pub mod scenario;
pub mod vehicle;
