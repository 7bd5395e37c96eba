pub mod monitor;
pub mod report;
pub mod scheduler;

pub use monitor::{MonitoringService, PollOutcome};
pub use report::{CycleOutcome, ReportMode, ReportingService};
pub use scheduler::PollScheduler;
