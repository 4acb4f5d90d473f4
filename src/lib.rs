//! Structured query logging: every query event becomes one JSON line in a
//! size-rotated log file, echoed to stdout for live debugging.

pub mod config;
pub mod logging;
pub mod query_log;
pub mod rotation;

pub use config::Config;
pub use query_log::{LogEntry, QueryEvent, QueryLogger};
pub use rotation::RotationPolicy;
