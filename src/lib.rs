//! Link monitor for small radio-linked flying robots.
//!
//! The [`stats`] module holds the streaming monitors (packet rate,
//! throughput, link quality); everything else wires them to a link and a
//! display.

pub mod cli;
pub mod link;
pub mod report;
pub mod serial;
pub mod session;
pub mod state;
pub mod stats;
pub mod telemetry;
pub mod timer;
pub mod ui;
