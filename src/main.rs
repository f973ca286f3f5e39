#![deny(clippy::unwrap_used)]

use clap::{arg, command, value_parser, ArgAction};
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::PathBuf;
use std::process::exit;
use tracing_subscriber::EnvFilter;

use nanovna_ctrl::locator::{enumerate_ports, NANOVNA_PID, NANOVNA_VID};
use nanovna_ctrl::measurement::bandwidth_hz;
use nanovna_ctrl::proto::transport::TimeoutPolicy;
use nanovna_ctrl::{
    CalStandard, Device, PowerLevel, ProtoError, Result, SessionConfig, DEFAULT_BAUDRATE,
};

#[tokio::main]
async fn main() {
    let matches = command!() // requires `cargo` feature
        .arg(
            arg!(
                -p --device <PORT> "Serial port of the NanoVNA (auto-detected if omitted)"
            )
            .required(false)
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(
            -d --debug ... "Turn debugging information on"
        ))
        .arg(
            arg!(
                -b --baudrate <BAUDRATE> "Baudrate"
            )
            .default_value(DEFAULT_BAUDRATE.to_string())
            .value_parser(value_parser!(u32)),
        )
        .arg(arg!(
            --lenient "Continue with partial replies instead of failing on timeouts"
        ))
        .subcommand(clap::Command::new("ports").about("List serial ports"))
        .subcommand(clap::Command::new("info").about("Device information"))
        .subcommand(clap::Command::new("help").about("Shell commands supported by the device"))
        .subcommand(clap::Command::new("pause").about("Pause sweeping"))
        .subcommand(clap::Command::new("resume").about("Resume sweeping"))
        .subcommand(clap::Command::new("frequencies").about("Frequencies of the current sweep"))
        .subcommand(
            clap::Command::new("measure")
                .about("Read S11 of the current sweep")
                .arg(
                    arg!(-a --avg <N> "Number of sweeps to average")
                        .default_value("1")
                        .value_parser(value_parser!(usize)),
                )
                .arg(arg!(--pause "Pause sweeping while reading").action(ArgAction::SetTrue)),
        )
        .subcommand(
            clap::Command::new("sweep")
                .about("Sweep range")
                .arg(arg!([start] "Start frequency in Hz").value_parser(value_parser!(u64)))
                .arg(arg!([stop] "Stop frequency in Hz").value_parser(value_parser!(u64)))
                .arg(arg!([points] "Number of points").value_parser(value_parser!(u32))),
        )
        .subcommand(
            clap::Command::new("power").about("Output power").arg(
                arg!([level] "Set power level, 0 to 3 or 255 for auto")
                    .value_parser(value_parser!(u8)),
            ),
        )
        .subcommand(
            clap::Command::new("bandwidth").about("IF bandwidth").arg(
                arg!([index] "Set bandwidth index, 4000 Hz / (index + 1)")
                    .value_parser(value_parser!(u16)),
            ),
        )
        .subcommand(clap::Command::new("calibrate").about("Guided open/short/load calibration"))
        .subcommand_required(true)
        .get_matches();

    let level = match matches.get_count("debug") {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();

    match handle_args(&matches).await {
        Ok(()) => {}
        Err(e) => {
            match e {
                ProtoError::DeviceNotFound { vid, pid } => {
                    eprintln!(
                        "No NanoVNA found (VID {:#06x}, PID {:#06x}). Is it plugged in?",
                        vid, pid
                    );
                }
                ProtoError::Connection { port, source } => {
                    if source.kind() == tokio_serial::ErrorKind::NoDevice
                        || matches!(source.kind(), tokio_serial::ErrorKind::Io(ErrorKind::NotFound))
                    {
                        eprintln!("{}: File not found", port);
                    } else {
                        eprintln!("I/O Error: {} [device: {}]", source, port);
                    }
                }
                ProtoError::TimeoutTruncated { expected, .. } => {
                    eprintln!(
                        "Device did not answer (waiting for {:?}), aborting! Try --lenient.",
                        expected
                    );
                }
                ProtoError::Abort => {
                    eprintln!("Failed to communicate with device, aborting!");
                }
                err => {
                    eprintln!("{}", err);
                }
            }
            exit(-1);
        }
    }
}

fn session_config(matches: &clap::ArgMatches) -> SessionConfig {
    let baudrate = matches
        .get_one::<u32>("baudrate")
        .copied()
        .unwrap_or(DEFAULT_BAUDRATE);
    let timeout_policy = if matches.get_flag("lenient") {
        TimeoutPolicy::Lenient
    } else {
        TimeoutPolicy::Strict
    };
    SessionConfig {
        baudrate,
        timeout_policy,
        ..Default::default()
    }
}

async fn handle_args(matches: &clap::ArgMatches) -> Result<()> {
    if let Some(("ports", _args)) = matches.subcommand() {
        for port in enumerate_ports()? {
            let marker = if port.matches(NANOVNA_VID, NANOVNA_PID) {
                " [NanoVNA]"
            } else {
                ""
            };
            match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => {
                    println!("{} {:04x}:{:04x}{}", port.port, vid, pid, marker)
                }
                _ => println!("{}", port.port),
            }
        }
        return Ok(());
    }

    let port = matches
        .get_one::<PathBuf>("device")
        .map(|p| p.to_string_lossy().to_string());
    let mut device = Device::connect(port.as_deref(), session_config(matches)).await?;

    match matches.subcommand() {
        Some(("info", _args)) => println!("{}", device.info().await?),
        Some(("help", _args)) => println!("{}", device.help().await?),
        Some(("pause", _args)) => {
            device.pause().await?;
            println!("OK");
        }
        Some(("resume", _args)) => {
            device.resume().await?;
            println!("OK");
        }
        Some(("frequencies", _args)) => {
            for f in device.frequencies().await? {
                println!("{}", f);
            }
        }
        Some(("measure", args)) => {
            let averages = args.get_one::<usize>("avg").copied().unwrap_or(1);
            let options = nanovna_ctrl::measurement::MeasureOptions {
                averages,
                pause_sweep: args.get_flag("pause"),
            };
            let mea = device.measure_with(options).await?;
            println!("# Hz S11 re im |S11| dB phase deg");
            for (f, s) in mea.points() {
                println!(
                    "{} {} {} {:.3} {:.2}",
                    f,
                    s.re,
                    s.im,
                    s.magnitude_db(),
                    s.phase_deg()
                );
            }
        }
        Some(("sweep", args)) => {
            let request = sweep_request(
                args.get_one::<u64>("start").copied(),
                args.get_one::<u64>("stop").copied(),
                args.get_one::<u32>("points").copied(),
            )?;
            if let Some((start, stop, points)) = request {
                device.setup_sweep(start, stop, points).await?;
                println!("OK");
            } else {
                let sweep = device.sweep().await?;
                println!(
                    "Sweep: {} Hz - {} Hz, {} points",
                    sweep.start_hz, sweep.stop_hz, sweep.points
                );
            }
        }
        Some(("power", args)) => {
            if let Some(level) = args.get_one::<u8>("level") {
                device.set_power(PowerLevel::new(*level)?).await?;
                println!("OK");
            } else {
                println!("{}", device.power().await?);
                println!("Legend: 0 to 3, 255 = auto");
            }
        }
        Some(("bandwidth", args)) => {
            if let Some(index) = args.get_one::<u16>("index") {
                device.set_bandwidth(*index).await?;
                println!("OK ({:.0} Hz)", bandwidth_hz(*index));
            } else {
                println!("{}", device.bandwidth().await?);
            }
        }
        Some(("calibrate", _args)) => {
            let stdin = io::stdin();
            let done = device
                .perform_1port_cal(|standard| {
                    confirm_stage(standard, &mut stdin.lock(), &mut io::stdout())
                })
                .await?;
            if done {
                println!("Calibration completed.");
            } else {
                println!("Calibration aborted, correction is off.");
            }
        }
        _ => {
            unreachable!("subcommand is required")
        }
    }

    device.close().await?;
    Ok(())
}

/// Sweep arguments to apply, or `None` to read the current sweep back.
fn sweep_request(
    start: Option<u64>,
    stop: Option<u64>,
    points: Option<u32>,
) -> Result<Option<(u64, u64, u32)>> {
    match (start, stop, points) {
        (Some(start), Some(stop), points) => Ok(Some((start, stop, points.unwrap_or(101)))),
        (None, None, None) => Ok(None),
        _ => Err(ProtoError::InvalidArgument(
            "Both start and stop frequency are required".to_string(),
        )),
    }
}

/// Asks the operator to attach `standard`. Anything but a confirmed line,
/// including a broken terminal, declines the stage.
fn confirm_stage(standard: CalStandard, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "Connect {} and press enter (q to abort): ", standard).is_err()
        || output.flush().is_err()
    {
        return false;
    }
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => line.trim() != "q",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_sweep_request() {
        assert_eq!(sweep_request(None, None, None).unwrap(), None);
        assert_eq!(
            sweep_request(Some(1_000_000), Some(2_000_000), None).unwrap(),
            Some((1_000_000, 2_000_000, 101))
        );
        assert!(matches!(
            sweep_request(Some(1_000_000), None, None),
            Err(ProtoError::InvalidArgument(_))
        ));
        assert!(sweep_request(None, None, Some(51)).is_err());
    }

    #[test]
    fn test_confirm_stage() {
        let mut out = Vec::new();
        assert!(confirm_stage(CalStandard::Open, &mut &b"\n"[..], &mut out));
        assert_eq!(out, b"Connect open and press enter (q to abort): ");
        assert!(!confirm_stage(CalStandard::Short, &mut &b"q\n"[..], &mut Vec::new()));
        assert!(!confirm_stage(CalStandard::Load, &mut &b""[..], &mut Vec::new()));
    }

    #[test]
    fn test_confirm_stage_failed_flush_declines() {
        assert!(!confirm_stage(CalStandard::Open, &mut &b"\n"[..], &mut BrokenPipe));
    }
}
