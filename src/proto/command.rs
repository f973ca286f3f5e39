use std::fmt;

use crate::measurement::{PowerLevel, SweepConfig};

/// Calibration shell sub-commands, in the order a one-port
/// calibration issues them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalStep {
    Off,
    Open,
    Short,
    Load,
    Done,
    On,
}

impl CalStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalStep::Off => "off",
            CalStep::Open => "open",
            CalStep::Short => "short",
            CalStep::Load => "load",
            CalStep::Done => "done",
            CalStep::On => "on",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Frequencies,
    Data,
    Info,
    Help,
    Pause,
    Resume,
    Cal(CalStep),
    // Bandwidth
    GetBandwidth,
    SetBandwidth(u16),
    // Sweep range
    GetSweep,
    SetSweep(SweepConfig),
    // Output power
    GetPower,
    SetPower(PowerLevel),
}

/// Renders the command line exactly as the instrument echoes it back.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Frequencies => f.write_str("frequencies"),
            Command::Data => f.write_str("data"),
            Command::Info => f.write_str("info"),
            Command::Help => f.write_str("help"),
            Command::Pause => f.write_str("pause"),
            Command::Resume => f.write_str("resume"),
            Command::Cal(step) => write!(f, "cal {}", step.as_str()),
            Command::GetBandwidth => f.write_str("bandwidth"),
            Command::SetBandwidth(index) => write!(f, "bandwidth {}", index),
            Command::GetSweep => f.write_str("sweep"),
            Command::SetSweep(sweep) => write!(
                f,
                "sweep {} {} {}",
                sweep.start_hz, sweep.stop_hz, sweep.points
            ),
            Command::GetPower => f.write_str("power"),
            Command::SetPower(level) => write!(f, "power {}", level.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_commands() {
        assert_eq!(Command::Frequencies.to_string(), "frequencies");
        assert_eq!(Command::Cal(CalStep::Short).to_string(), "cal short");
        assert_eq!(Command::SetBandwidth(3).to_string(), "bandwidth 3");
        assert_eq!(
            Command::SetSweep(SweepConfig {
                start_hz: 50_000,
                stop_hz: 900_000_000,
                points: 101
            })
            .to_string(),
            "sweep 50000 900000000 101"
        );
        assert_eq!(Command::SetPower(PowerLevel::AUTO).to_string(), "power 255");
    }
}
