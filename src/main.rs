use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use fliemon::cli::{Cli, Commands, ScanFormat};
use fliemon::link::{SerialLink, SimConfig, SimLink};
use fliemon::serial::{scan_interfaces, select_interface, InterfaceInfo, InterfaceSelectError};
use fliemon::session::run_session;

fn print_interfaces(all: bool, verbose: bool, format: ScanFormat) -> Result<()> {
    let found: Vec<InterfaceInfo> = scan_interfaces(all).into_iter().map(InterfaceInfo::from).collect();
    match format {
        ScanFormat::Text => {
            if found.is_empty() {
                return Err(InterfaceSelectError::NoInterfaces.into());
            }
            for info in &found {
                if verbose {
                    println!("{}", info.describe());
                } else {
                    println!("{}", info.name);
                }
            }
        }
        ScanFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Scan { all, verbose, format }) => print_interfaces(all, verbose, format),
        Some(Commands::Monitor(monitor)) => select_interface(&monitor.serial)
            .map_err(anyhow::Error::from)
            .and_then(|path| run_session(Box::new(SerialLink::new(path, monitor.baud)), monitor.opts)),
        Some(Commands::Simulate(sim)) => {
            let link = SimLink::new(SimConfig { packet_hz: sim.packet_hz, loss: sim.loss, seed: sim.seed });
            run_session(Box::new(link), sim.opts)
        }
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: no interfaces, 3: multiple interfaces, 4: invalid configuration, 5: serial open failure, 1: other
    for cause in err.chain() {
        if let Some(sel) = cause.downcast_ref::<fliemon::serial::InterfaceSelectError>() {
            return match sel {
                fliemon::serial::InterfaceSelectError::NoInterfaces => 2,
                fliemon::serial::InterfaceSelectError::MultipleInterfaces { .. } => 3,
            };
        }
        if cause.is::<fliemon::stats::ConfigError>() {
            return 4;
        }
        if cause.is::<serialport::Error>() {
            return 5;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_no_interfaces() {
        let err = anyhow::Error::from(fliemon::serial::InterfaceSelectError::NoInterfaces);
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn exit_code_multiple_interfaces() {
        let err = anyhow::Error::from(fliemon::serial::InterfaceSelectError::MultipleInterfaces {
            list: vec!["a".into(), "b".into()],
        });
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn exit_code_invalid_window() {
        let err = anyhow::Error::from(fliemon::stats::ConfigError::ZeroWindow { what: "rate monitor" })
            .context("Building monitors");
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn exit_code_serial_error() {
        let serr = serialport::Error::new(serialport::ErrorKind::NoDevice, "no device");
        let err = anyhow::Error::from(serr).context("Opening serial port /dev/ttyACM0");
        assert_eq!(exit_code_for_error(&err), 5);
    }

    #[test]
    fn exit_code_other() {
        let err = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
