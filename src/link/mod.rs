//! Transports to the vehicle. The session only sees packets, their size and
//! a quality sample; what the bytes mean is up to the link.

pub mod serial;
pub mod sim;

use std::io;
use std::time::Duration;

use bytes::Bytes;

use crate::telemetry::BatteryState;

pub use serial::SerialLink;
pub use sim::{SimConfig, SimLink};

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Data(Bytes),
    /// One console fragment, see [`crate::telemetry::ConsoleAssembler`].
    Console(String),
    Battery { millivolts: u16, state: BatteryState },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    Packet { size: usize, quality: u8, payload: Payload },
    /// Nothing arrived in time. Some links still know how the link did.
    Timeout { quality: Option<u8> },
}

pub trait Link: Send {
    fn name(&self) -> String;
    fn open(&mut self) -> anyhow::Result<()>;
    fn close(&mut self);
    fn recv(&mut self, timeout: Duration) -> io::Result<Incoming>;
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
}

pub(crate) fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "link is not open")
}
