use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::MonitorOpts;
use crate::link::{Incoming, Link, Payload};
use crate::state::{LinkEvent, LinkState};
use crate::stats::{LinkQualitySmoother, RateMonitor, ThroughputMonitor};
use crate::telemetry::{power_to_percentage, BatteryState, ConsoleAssembler};

const RECV_SLICE: Duration = Duration::from_millis(20);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_WAIT: Duration = Duration::from_secs(1);
/// Packets after the first one before the link counts as fully up.
const READY_AFTER_PACKETS: u32 = 10;
/// Keep-alive packet, empty payload on the null port.
const PING: [u8; 1] = [0xff];

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Battery {
    pub millivolts: u16,
    pub percent: f64,
    pub state: BatteryState,
}

#[derive(Clone, Copy, Debug)]
pub struct Status {
    pub state: LinkState,
    pub quality: Option<u8>,
    pub battery: Option<Battery>,
}

/// One snapshot of everything the display layer shows.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Report {
    pub state: LinkState,
    pub packets_in_hz: f64,
    pub packets_out_hz: f64,
    pub bytes_in_per_sec: u64,
    pub bytes_out_per_sec: u64,
    pub link_quality: Option<u8>,
    pub battery: Option<Battery>,
}

/// Monitors and status for one vehicle link, shared by the link thread
/// (writer) and the display (reader).
pub struct Telemetry {
    pub packets_in: Mutex<RateMonitor>,
    pub packets_out: Mutex<RateMonitor>,
    pub bytes_in: ThroughputMonitor,
    pub bytes_out: ThroughputMonitor,
    quality: Mutex<LinkQualitySmoother>,
    status: Mutex<Status>,
    poll_hz: AtomicI32,
    events: channel::Sender<String>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Telemetry {
    pub fn new(opts: &MonitorOpts, events: channel::Sender<String>) -> Result<Self> {
        Ok(Self {
            packets_in: Mutex::new(RateMonitor::new(opts.rate_window)?),
            packets_out: Mutex::new(RateMonitor::new(opts.rate_window)?),
            bytes_in: ThroughputMonitor::new("in").context("Starting inbound throughput poller")?,
            bytes_out: ThroughputMonitor::new("out").context("Starting outbound throughput poller")?,
            quality: Mutex::new(LinkQualitySmoother::new(opts.quality_window, opts.quality_policy)?),
            status: Mutex::new(Status { state: LinkState::Disconnected, quality: None, battery: None }),
            poll_hz: AtomicI32::new(opts.poll_hz),
            events,
        })
    }

    pub fn status(&self) -> Status {
        *lock(&self.status)
    }

    pub fn state(&self) -> LinkState {
        lock(&self.status).state
    }

    pub fn poll_hz(&self) -> i32 {
        self.poll_hz.load(Ordering::Relaxed)
    }

    /// Change how often throughput is published, on both directions.
    pub fn set_poll_hz(&self, hz: i32) {
        self.poll_hz.store(hz, Ordering::Relaxed);
        self.bytes_in.set_rate(hz);
        self.bytes_out.set_rate(hz);
        info!(hz, "Throughput poll rate changed");
    }

    /// Toggle throughput polling with an explicit stop/start.
    pub fn toggle_polling(&self) -> bool {
        if self.bytes_in.is_running() {
            self.bytes_in.stop();
            self.bytes_out.stop();
            false
        } else {
            self.bytes_in.start();
            self.bytes_out.start();
            self.bytes_in.is_running()
        }
    }

    fn emit(&self, msg: String) {
        let _ = self.events.send(msg);
    }

    /// Apply `event` to the link state. Invalid events are logged and
    /// ignored.
    pub fn transition(&self, event: LinkEvent) -> LinkState {
        let (from, to) = {
            let mut status = lock(&self.status);
            let from = status.state;
            match from.next(event) {
                Ok(to) => {
                    status.state = to;
                    (from, to)
                }
                Err(e) => {
                    warn!(%e, "Ignoring link event");
                    return from;
                }
            }
        };

        info!(%from, %to, "Link state");
        self.emit(format!("Link: {to}"));

        match to {
            LinkState::ConnectionRequested => {
                let hz = self.poll_hz();
                self.bytes_in.set_rate(hz);
                self.bytes_out.set_rate(hz);
                self.bytes_in.start();
                self.bytes_out.start();
            }
            LinkState::Disconnected | LinkState::ConnectionFailed => {
                self.bytes_in.set_rate(0);
                self.bytes_out.set_rate(0);
            }
            _ => {}
        }
        to
    }

    fn record_quality(&self, sample: u8) {
        let summary = lock(&self.quality).add_measurement(sample);
        if let Some(q) = summary {
            lock(&self.status).quality = Some(q);
            debug!(quality = q, "Link quality");
        }
    }

    fn record_incoming(&self, size: usize, quality: u8) {
        lock(&self.packets_in).count();
        self.bytes_in.count(size as u64);
        self.record_quality(quality);
    }

    fn record_outgoing(&self, size: usize) {
        lock(&self.packets_out).count();
        self.bytes_out.count(size as u64);
    }

    fn record_battery(&self, millivolts: u16, state: BatteryState) {
        let percent = power_to_percentage(millivolts as f64);
        lock(&self.status).battery = Some(Battery { millivolts, percent, state });
    }

    /// Fresh packet rates plus the given throughput readings.
    pub fn report(&self, bytes_in: u64, bytes_out: u64, use_cached: bool) -> Report {
        let status = self.status();
        Report {
            state: status.state,
            packets_in_hz: lock(&self.packets_in).get_rate(use_cached),
            packets_out_hz: lock(&self.packets_out).get_rate(use_cached),
            bytes_in_per_sec: bytes_in,
            bytes_out_per_sec: bytes_out,
            link_quality: status.quality,
            battery: status.battery,
        }
    }
}

/// Sleep up to `total`, returning early once `stop` is set.
fn wait(stop: &AtomicBool, total: Duration) {
    let until = Instant::now() + total;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= until {
            break;
        }
        thread::sleep((until - now).min(Duration::from_millis(50)));
    }
}

enum Outcome {
    Stopped,
    Failed,
    Lost,
}

/// Drive one link until `stop` is set, reconnecting after failures unless
/// `no_retry` is set.
pub fn drive_link(link: &mut dyn Link, telemetry: &Telemetry, opts: &MonitorOpts, stop: &AtomicBool) -> Result<()> {
    let name = link.name();
    loop {
        telemetry.transition(LinkEvent::ConnectRequested);
        info!(link = %name, "Requesting connection");

        let outcome = match link.open() {
            Ok(()) => run_connection(link, telemetry, opts, stop),
            Err(e) => {
                warn!(error = %e, link = %name, "Opening link failed");
                telemetry.emit(format!("Open failed: {e:#}"));
                if opts.no_retry {
                    telemetry.transition(LinkEvent::Failed);
                    return Err(e);
                }
                Outcome::Failed
            }
        };
        link.close();

        match outcome {
            Outcome::Stopped => {
                telemetry.transition(LinkEvent::Disconnect);
                return Ok(());
            }
            Outcome::Failed => {
                telemetry.transition(LinkEvent::Failed);
            }
            Outcome::Lost => {
                telemetry.transition(LinkEvent::Lost);
            }
        }

        if opts.no_retry {
            return Err(anyhow!("Link {name} went down"));
        }
        telemetry.transition(LinkEvent::RetryScheduled);
        wait(stop, RETRY_WAIT);
        if stop.load(Ordering::Relaxed) {
            telemetry.transition(LinkEvent::Disconnect);
            return Ok(());
        }
    }
}

fn run_connection(link: &mut dyn Link, telemetry: &Telemetry, opts: &MonitorOpts, stop: &AtomicBool) -> Outcome {
    let started = Instant::now();
    let ping_every = (opts.ping_hz > 0).then(|| Duration::from_secs_f64(1.0 / opts.ping_hz as f64));
    let mut next_ping = Instant::now();
    let mut packets_since_up: u32 = 0;
    let mut console = ConsoleAssembler::new();

    while !stop.load(Ordering::Relaxed) {
        if let Some(every) = ping_every {
            if Instant::now() >= next_ping {
                next_ping += every;
                match link.send(&PING) {
                    Ok(()) => telemetry.record_outgoing(PING.len()),
                    Err(e) => {
                        warn!(?e, "Link write failed");
                        return lost_or_failed(telemetry);
                    }
                }
            }
        }

        match link.recv(RECV_SLICE) {
            Ok(Incoming::Packet { size, quality, payload }) => {
                telemetry.record_incoming(size, quality);
                match telemetry.state() {
                    LinkState::ConnectionRequested => {
                        telemetry.transition(LinkEvent::FirstPacket);
                    }
                    LinkState::LinkEstablished => {
                        packets_since_up += 1;
                        if packets_since_up >= READY_AFTER_PACKETS {
                            telemetry.transition(LinkEvent::Ready);
                        }
                    }
                    _ => {}
                }
                match payload {
                    Payload::Console(fragment) => {
                        if let Some(line) = console.push(&fragment) {
                            info!(console = %line.trim_end(), "Vehicle console");
                            telemetry.emit(line.trim_end().to_string());
                        }
                    }
                    Payload::Battery { millivolts, state } => telemetry.record_battery(millivolts, state),
                    Payload::Data(_) => {}
                }
            }
            Ok(Incoming::Timeout { quality }) => {
                if let Some(q) = quality {
                    telemetry.record_quality(q);
                }
                if telemetry.state() == LinkState::ConnectionRequested && started.elapsed() > CONNECT_TIMEOUT {
                    warn!("No packets from the vehicle, giving up on this attempt");
                    return Outcome::Failed;
                }
            }
            Err(e) => {
                warn!(?e, "Link read failed");
                return lost_or_failed(telemetry);
            }
        }
    }
    Outcome::Stopped
}

fn lost_or_failed(telemetry: &Telemetry) -> Outcome {
    if telemetry.state() == LinkState::ConnectionRequested {
        Outcome::Failed
    } else {
        Outcome::Lost
    }
}

/// Run a monitoring session: link thread plus either the terminal UI or the
/// headless reporter, until Ctrl-C / `q`.
pub fn run_session(mut link: Box<dyn Link>, opts: MonitorOpts) -> Result<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }
    run_session_with_shutdown(link.as_mut(), opts, stop_flag)
}

pub(crate) fn run_session_with_shutdown(link: &mut dyn Link, opts: MonitorOpts, stop_flag: Arc<AtomicBool>) -> Result<()> {
    let (event_tx, event_rx) = channel::unbounded::<String>();
    let telemetry = Arc::new(Telemetry::new(&opts, event_tx)?);
    info!(link = %link.name(), poll_hz = opts.poll_hz, "Starting fliemon");

    thread::scope(|s| -> Result<()> {
        let link_thread = s.spawn(|| {
            let result = drive_link(link, &telemetry, &opts, &stop_flag);
            // nothing left to display once the link gives up
            stop_flag.store(true, Ordering::Relaxed);
            result
        });

        let display = if opts.headless {
            // console lines are logged by the link thread; nobody reads the pane feed
            drop(event_rx);
            crate::report::run_reporter(&telemetry, &opts, &stop_flag)
        } else {
            crate::ui::overview::run_tui(Arc::clone(&telemetry), event_rx, Arc::clone(&stop_flag))
        };
        stop_flag.store(true, Ordering::Relaxed);

        let linked = link_thread.join().unwrap_or_else(|_| Err(anyhow!("Link thread panicked")));
        info!("Shutting down");
        display.and(linked)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{SimConfig, SimLink};
    use crate::stats::QualityPolicy;

    fn opts() -> MonitorOpts {
        MonitorOpts {
            poll_hz: 10,
            rate_window: 20,
            quality_window: 5,
            quality_policy: QualityPolicy::Count,
            ping_hz: 100,
            headless: true,
            json: false,
            report_secs: 1,
            no_retry: true,
        }
    }

    #[test]
    fn connection_requested_starts_throughput_polling() {
        let (tx, _rx) = channel::unbounded();
        let t = Telemetry::new(&opts(), tx).unwrap();
        assert!(!t.bytes_in.is_running());
        t.transition(LinkEvent::ConnectRequested);
        assert!(t.bytes_in.is_running());
        assert!(t.bytes_out.is_running());

        t.transition(LinkEvent::Failed);
        assert!(!t.bytes_in.is_running());
        assert!(t.bytes_in.is_soft_stopped());
    }

    #[test]
    fn invalid_event_keeps_state() {
        let (tx, rx) = channel::unbounded();
        let t = Telemetry::new(&opts(), tx).unwrap();
        assert_eq!(t.transition(LinkEvent::Ready), LinkState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn zero_windows_fail_fast() {
        let (tx, _rx) = channel::unbounded();
        let mut o = opts();
        o.quality_window = 0;
        assert!(Telemetry::new(&o, tx).is_err());
    }

    #[test]
    fn simulated_link_comes_up_and_reports() {
        let (tx, rx) = channel::unbounded();
        let o = opts();
        let t = Telemetry::new(&o, tx).unwrap();
        let stop = AtomicBool::new(false);
        let mut link = SimLink::new(SimConfig { packet_hz: 500.0, loss: 0.0, seed: 3 });

        thread::scope(|s| {
            let h = s.spawn(|| drive_link(&mut link, &t, &o, &stop));
            let deadline = Instant::now() + Duration::from_secs(5);
            while t.state() != LinkState::Connected && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(200));
            stop.store(true, Ordering::Relaxed);
            h.join().unwrap().unwrap();
        });

        assert_eq!(t.state(), LinkState::Disconnected);
        let status = t.status();
        assert_eq!(status.quality, Some(100));
        assert!(status.battery.is_some());

        let msgs: Vec<String> = rx.try_iter().collect();
        assert!(msgs.iter().any(|m| m == "Link: connected"));
        assert!(msgs.iter().any(|m| m.starts_with("SYS: simulated vehicle booting")));
    }

    #[test]
    fn failed_open_without_retry_is_an_error() {
        struct Broken;
        impl Link for Broken {
            fn name(&self) -> String {
                "broken".into()
            }
            fn open(&mut self) -> anyhow::Result<()> {
                Err(anyhow!("no dongle"))
            }
            fn close(&mut self) {}
            fn recv(&mut self, _timeout: Duration) -> std::io::Result<Incoming> {
                unreachable!()
            }
            fn send(&mut self, _data: &[u8]) -> std::io::Result<()> {
                unreachable!()
            }
        }

        let (tx, _rx) = channel::unbounded();
        let o = opts();
        let t = Telemetry::new(&o, tx).unwrap();
        let stop = AtomicBool::new(false);
        let err = drive_link(&mut Broken, &t, &o, &stop).unwrap_err();
        assert!(err.to_string().contains("no dongle"));
        assert_eq!(t.state(), LinkState::ConnectionFailed);
    }
}
