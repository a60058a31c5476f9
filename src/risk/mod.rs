// Risk management module
pub mod drawdown;
pub mod monitor;

pub use drawdown::{DrawdownGuard, DrawdownReading, DrawdownTrip};
pub use monitor::{EmergencyReport, RiskMonitor, RiskOutcome, StatusReport};
