// Order submission and the entry / exit batches built on it
pub mod entry;
pub mod exit_scheduler;
pub mod gateway;

pub use entry::{EntryScanner, ScanOutcome, ScanReport, SkipReason};
pub use exit_scheduler::{close_deadline, ExitReport, ExitScheduler};
pub use gateway::{parse_order_response, OrderGateway, RetryPolicy};
