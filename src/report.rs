use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::MonitorOpts;
use crate::session::{Report, Telemetry};
use crate::stats::notify::Subscription;

/// Most recent value a throughput subscriber has seen.
pub struct Latest {
    rx: Subscription<u64>,
    value: u64,
}

impl Latest {
    pub fn new(rx: Subscription<u64>) -> Self {
        Self { rx, value: 0 }
    }

    pub fn get(&mut self) -> u64 {
        if let Some(v) = self.rx.try_iter().last() {
            self.value = v;
        }
        self.value
    }
}

/// Headless display: log (or print as JSON) a report every `report_secs`.
pub fn run_reporter(telemetry: &Telemetry, opts: &MonitorOpts, stop: &AtomicBool) -> Result<()> {
    let mut bytes_in = Latest::new(telemetry.bytes_in.subscribe());
    let mut bytes_out = Latest::new(telemetry.bytes_out.subscribe());
    let every = Duration::from_secs(opts.report_secs.max(1));
    let mut next = Instant::now() + every;

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
        if Instant::now() < next {
            continue;
        }
        next += every;

        let report = telemetry.report(bytes_in.get(), bytes_out.get(), false);
        if opts.json {
            println!("{}", report_json(&report)?);
        } else {
            info!(
                state = %report.state,
                packets_in_hz = report.packets_in_hz,
                packets_out_hz = report.packets_out_hz,
                bytes_in_per_sec = report.bytes_in_per_sec,
                bytes_out_per_sec = report.bytes_out_per_sec,
                link_quality = ?report.link_quality,
                battery_percent = ?report.battery.map(|b| b.percent),
                "Link stats"
            );
        }
    }
    Ok(())
}

pub fn report_json(report: &Report) -> Result<String> {
    serde_json::to_string(report).context("Serializing link report")
}
