//! Streaming link statistics: packet rate, throughput and link quality.

pub mod clock;
pub mod notify;
pub mod quality;
pub mod rate;
pub mod throughput;

pub use clock::{Clock, ManualClock, SystemClock};
pub use quality::{LinkQualitySmoother, QualityPolicy};
pub use rate::RateMonitor;
pub use throughput::ThroughputMonitor;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{what} window must be at least 1")]
    ZeroWindow { what: &'static str },
    #[error("{what} window of {window} samples is too large")]
    WindowTooLarge { what: &'static str, window: usize },
}
