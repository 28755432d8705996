pub mod config;
pub mod profile;
pub mod runner;
pub mod world;
