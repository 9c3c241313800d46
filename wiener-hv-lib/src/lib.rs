pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod snmp;
pub mod status;
pub mod store;
pub mod supervisor;

// Re-export the main types for easy access
pub use channel::{ChannelId, DeviceChannel, Parameter, SwitchState, WriteValue};
pub use config::HvConfig;
pub use controller::{ChannelReading, SetReport, VoltageController};
pub use error::{HvError, Result};
pub use snmp::NetSnmp;
pub use status::{ChannelStatus, StatusReporter};
pub use store::VoltageSetting;
pub use supervisor::{ShutdownOutcome, ShutdownPhase, ShutdownReport, ShutdownSupervisor};
