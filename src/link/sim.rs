use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{not_open, Incoming, Link, Payload};
use crate::stats::quality::MAX_QUALITY;
use crate::telemetry::{BatteryState, CONSOLE_FRAGMENT_LEN, MAX_POWER_MV};

const BATTERY_EVERY: u64 = 25;
const CONSOLE_EVERY: u64 = 10;
const STATUS_EVERY: u64 = 2_000;
const LOW_POWER_MV: f64 = 3_300.0;
const DRAIN_PER_PACKET_MV: f64 = 0.02;

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub packet_hz: f64,
    /// Probability that a packet needs retries and never arrives.
    pub loss: f64,
    pub seed: u64,
}

/// Simulated vehicle. Streams data, console text and battery readings at a
/// fixed cadence with random loss.
pub struct SimLink {
    config: SimConfig,
    rng: StdRng,
    open: bool,
    next_at: Instant,
    seq: u64,
    battery_mv: f64,
    console: VecDeque<String>,
}

impl SimLink {
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            open: false,
            next_at: Instant::now(),
            seq: 0,
            battery_mv: MAX_POWER_MV,
            console: VecDeque::new(),
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.packet_hz.max(0.1))
    }

    fn queue_console(&mut self, msg: &str) {
        self.console.extend(split_console(msg));
    }

    fn next_payload(&mut self) -> Payload {
        self.seq += 1;
        self.battery_mv = (self.battery_mv - DRAIN_PER_PACKET_MV).max(0.0);

        if self.seq % STATUS_EVERY == 0 {
            let msg = format!("SYS: {} packets sent, battery {:.0} mV\n", self.seq, self.battery_mv);
            self.queue_console(&msg);
        }
        if self.seq % BATTERY_EVERY == 0 {
            let state = if self.battery_mv < LOW_POWER_MV {
                BatteryState::LowPower
            } else {
                BatteryState::Battery
            };
            return Payload::Battery { millivolts: self.battery_mv as u16, state };
        }
        if self.seq % CONSOLE_EVERY == 0 {
            if let Some(fragment) = self.console.pop_front() {
                return Payload::Console(fragment);
            }
        }
        let len = self.rng.random_range(1..=31);
        let mut data = vec![0u8; len];
        self.rng.fill(&mut data[..]);
        Payload::Data(Bytes::from(data))
    }
}

/// Cut `msg` into console fragments. The last fragment is always shorter
/// than a full one so the receiver knows the message ended.
pub fn split_console(msg: &str) -> Vec<String> {
    let bytes = msg.as_bytes();
    let mut out: Vec<String> = bytes
        .chunks(CONSOLE_FRAGMENT_LEN)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect();
    if bytes.len() % CONSOLE_FRAGMENT_LEN == 0 {
        out.push(String::new());
    }
    out
}

fn payload_size(payload: &Payload) -> usize {
    // one header byte, as on the real radio
    1 + match payload {
        Payload::Data(b) => b.len(),
        Payload::Console(s) => s.len(),
        Payload::Battery { .. } => 3,
    }
}

impl Link for SimLink {
    fn name(&self) -> String {
        format!("sim:{}Hz", self.config.packet_hz)
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.open = true;
        self.next_at = Instant::now() + self.period();
        self.console.clear();
        self.queue_console("SYS: simulated vehicle booting\n");
        self.queue_console("SYS: radio link up, starting telemetry\n");
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Incoming> {
        if !self.open {
            return Err(not_open());
        }
        let now = Instant::now();
        if self.next_at > now + timeout {
            thread::sleep(timeout);
            return Ok(Incoming::Timeout { quality: None });
        }
        if self.next_at > now {
            thread::sleep(self.next_at - now);
        }
        self.next_at += self.period();

        if self.rng.random_bool(self.config.loss.clamp(0.0, 1.0)) {
            let quality = self.rng.random_range(0..MAX_QUALITY);
            return Ok(Incoming::Timeout { quality: Some(quality) });
        }
        let payload = self.next_payload();
        Ok(Incoming::Packet { size: payload_size(&payload), quality: MAX_QUALITY, payload })
    }

    fn send(&mut self, _data: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(not_open());
        }
        Ok(())
    }
}
