pub mod evidence_status;
pub mod report;
pub mod start_monitoring;
pub mod stop_monitoring;

pub use evidence_status::evidence_status;
pub use report::report;
pub use start_monitoring::start_monitoring;
pub use stop_monitoring::stop_monitoring;
