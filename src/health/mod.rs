pub mod aggregator;
pub mod probe;

pub use aggregator::{StatusChange, UptimeAggregator, UptimeStats};
pub use probe::ProbeScheduler;
