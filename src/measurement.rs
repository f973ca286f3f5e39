use std::{fmt, str::FromStr};

use crate::proto::{ProtoError, Result};

/// Measurement frequencies in Hz, in the order the instrument reports them.
pub type FrequencySweep = Vec<f64>;

/// One reflection coefficient (S11) sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComplexSample {
    pub re: f64,
    pub im: f64,
}

impl ComplexSample {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn magnitude(&self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn magnitude_db(&self) -> f64 {
        20.0 * self.magnitude().log10()
    }

    pub fn phase_deg(&self) -> f64 {
        self.im.atan2(self.re).to_degrees()
    }
}

impl fmt::Display for ComplexSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im.is_sign_negative() {
            write!(f, "{}-{}j", self.re, -self.im)
        } else {
            write!(f, "{}+{}j", self.re, self.im)
        }
    }
}

/// Frequencies and samples of one sweep, index aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    frequencies: FrequencySweep,
    samples: Vec<ComplexSample>,
}

impl Measurement {
    pub fn new(frequencies: FrequencySweep, samples: Vec<ComplexSample>) -> Result<Self> {
        if frequencies.len() != samples.len() {
            return Err(ProtoError::LengthMismatch {
                expected: frequencies.len(),
                found: samples.len(),
            });
        }
        Ok(Self {
            frequencies,
            samples,
        })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn samples(&self) -> &[ComplexSample] {
        &self.samples
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, ComplexSample)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.samples.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_parts(self) -> (FrequencySweep, Vec<ComplexSample>) {
        (self.frequencies, self.samples)
    }
}

/// Sweep range as understood by the `sweep` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub start_hz: u64,
    pub stop_hz: u64,
    pub points: u32,
}

impl SweepConfig {
    pub fn new(start_hz: u64, stop_hz: u64, points: u32) -> Result<Self> {
        if start_hz >= stop_hz {
            return Err(ProtoError::InvalidArgument(format!(
                "Sweep start {} Hz must be below stop {} Hz",
                start_hz, stop_hz
            )));
        }
        if points == 0 {
            return Err(ProtoError::InvalidArgument(
                "Sweep needs at least one point".to_string(),
            ));
        }
        Ok(Self {
            start_hz,
            stop_hz,
            points,
        })
    }
}

/// Parses the `sweep` reply, `<start> <stop> <points>`.
impl FromStr for SweepConfig {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<&str> = s.split_whitespace().collect();
        if values.len() != 3 {
            return Err(ProtoError::parse(s, "expected <start> <stop> <points>"));
        }
        let start_hz = values[0]
            .parse::<u64>()
            .map_err(|e| ProtoError::parse(s, e))?;
        let stop_hz = values[1]
            .parse::<u64>()
            .map_err(|e| ProtoError::parse(s, e))?;
        let points = values[2]
            .parse::<u32>()
            .map_err(|e| ProtoError::parse(s, e))?;
        Ok(Self {
            start_hz,
            stop_hz,
            points,
        })
    }
}

/// Output drive level: 0 to 3, or 255 for automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLevel(u8);

impl PowerLevel {
    pub const AUTO: PowerLevel = PowerLevel(255);

    pub fn new(level: u8) -> Result<Self> {
        match level {
            0..=3 | 255 => Ok(Self(level)),
            _ => Err(ProtoError::InvalidArgument(format!(
                "Power level {} not in 0..=3 or 255 (auto)",
                level
            ))),
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_auto(&self) -> bool {
        *self == Self::AUTO
    }
}

/// IF bandwidth for a `bandwidth` index: 4000 Hz / (index + 1).
pub fn bandwidth_hz(index: u16) -> f64 {
    4000.0 / (f64::from(index) + 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureOptions {
    /// Number of `data` reads averaged into the result.
    pub averages: usize,
    /// Pause the sweep while reading and resume afterwards.
    pub pause_sweep: bool,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            averages: 1,
            pause_sweep: false,
        }
    }
}
