use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use serialport::SerialPort;
use tracing::debug;

use super::{not_open, Incoming, Link, Payload};
use crate::stats::quality::MAX_QUALITY;

const READ_BUFFER: usize = 4096;

/// Radio dongle attached as a serial device.
///
/// Bytes are not interpreted. A read that returns data is a perfect quality
/// sample and a read that times out is a zero one.
pub struct SerialLink {
    path: String,
    baud: u32,
    port: Option<Box<dyn SerialPort>>,
    buffer: Vec<u8>,
}

impl SerialLink {
    pub fn new(path: String, baud: u32) -> Self {
        Self { path, baud, port: None, buffer: vec![0u8; READ_BUFFER] }
    }
}

impl Link for SerialLink {
    fn name(&self) -> String {
        format!("serial:{}", self.path)
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let port = serialport::new(&self.path, self.baud)
            .timeout(Duration::from_millis(20))
            .open()
            .with_context(|| format!("Opening serial port {}", self.path))?;
        debug!(path = %self.path, baud = self.baud, "Serial link open");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Incoming> {
        let port = self.port.as_mut().ok_or_else(not_open)?;
        port.set_timeout(timeout)?;
        match port.read(&mut self.buffer) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => Ok(Incoming::Packet {
                size: n,
                quality: MAX_QUALITY,
                payload: Payload::Data(Bytes::copy_from_slice(&self.buffer[..n])),
            }),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Incoming::Timeout { quality: Some(0) }),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port.as_mut().ok_or_else(not_open)?;
        port.write_all(data)?;
        port.flush()
    }
}
