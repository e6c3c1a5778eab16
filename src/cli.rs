use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::stats::QualityPolicy;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List radio interfaces the vehicle can be reached through
    Scan {
        /// Include non-USB serial ports as well
        #[arg(long)]
        all: bool,
        /// Show detailed metadata
        #[arg(long)]
        verbose: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = ScanFormat::Text)]
        format: ScanFormat,
    },
    /// Connect to the vehicle through a radio interface and monitor the link
    Monitor(Monitor),
    /// Monitor a simulated vehicle link
    Simulate(Simulate),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ScanFormat {
    Text,
    Json,
}

#[derive(Parser, Clone, Debug)]
pub struct Monitor {
    /// Serial device of the radio (auto-select if exactly one is found and this is omitted)
    #[arg(long)]
    pub serial: Option<String>,

    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,

    #[command(flatten)]
    pub opts: MonitorOpts,
}

#[derive(Parser, Clone, Debug)]
pub struct Simulate {
    /// Packets per second the simulated vehicle sends
    #[arg(long, default_value_t = 100.0)]
    pub packet_hz: f64,

    /// Probability that a packet is lost (0.0 - 1.0)
    #[arg(long, default_value_t = 0.05)]
    pub loss: f64,

    /// Seed for the simulated traffic
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    #[command(flatten)]
    pub opts: MonitorOpts,
}

#[derive(Args, Clone, Debug)]
pub struct MonitorOpts {
    /// How often throughput is reported, in Hz (0 disables)
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub poll_hz: i32,

    /// Number of recent packets the packet rate is estimated from
    #[arg(long, default_value_t = 200)]
    pub rate_window: usize,

    /// Number of link quality samples summarized into one value
    #[arg(long, default_value_t = 50)]
    pub quality_window: usize,

    /// How link quality samples are summarized
    #[arg(long, value_enum, default_value_t = QualityPolicy::Count)]
    pub quality_policy: QualityPolicy,

    /// Keep-alive packets sent to the vehicle per second (0 disables)
    #[arg(long, default_value_t = 50)]
    pub ping_hz: u32,

    /// No terminal UI; log statistics instead
    #[arg(long)]
    pub headless: bool,

    /// With --headless, print one JSON object per report to stdout
    #[arg(long, requires = "headless")]
    pub json: bool,

    /// Seconds between headless reports
    #[arg(long, default_value_t = 5)]
    pub report_secs: u64,

    /// Do not reconnect after the link fails or is lost
    #[arg(long)]
    pub no_retry: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::parse_from(["fliemon", "simulate"]);
        match cli.command {
            Some(Commands::Simulate(sim)) => {
                assert_eq!(sim.opts.poll_hz, 5);
                assert_eq!(sim.opts.rate_window, 200);
                assert_eq!(sim.opts.quality_window, 50);
                assert_eq!(sim.opts.quality_policy, QualityPolicy::Count);
                assert!(!sim.opts.headless);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn monitor_accepts_policy_and_disabled_polling() {
        let cli = Cli::parse_from([
            "fliemon",
            "monitor",
            "--serial",
            "/dev/ttyACM0",
            "--quality-policy",
            "minimum",
            "--poll-hz",
            "0",
            "--headless",
            "--json",
        ]);
        match cli.command {
            Some(Commands::Monitor(m)) => {
                assert_eq!(m.serial.as_deref(), Some("/dev/ttyACM0"));
                assert_eq!(m.opts.quality_policy, QualityPolicy::Minimum);
                assert_eq!(m.opts.poll_hz, 0);
                assert!(m.opts.json);
            }
            _ => panic!("expected monitor"),
        }
    }

    #[test]
    fn json_requires_headless() {
        assert!(Cli::try_parse_from(["fliemon", "simulate", "--json"]).is_err());
    }
}
