pub mod dispatcher;

pub use dispatcher::{BatteryDerating, CommandDispatcher, DispatchConfig};
