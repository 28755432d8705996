pub mod clock;
pub mod runner;
pub mod slots;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use runner::{MissionConfig, Supervisor, SupervisorConfig, TickOutcome, TickReport};
pub use slots::{channels, InputPublishers, InputSlots, TickInputs};
