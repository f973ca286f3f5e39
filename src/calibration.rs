//! Guided one-port (open/short/load) calibration.
//!
//! The instrument computes the calibration itself; the host only tells it
//! which standard is attached. Between standards the operator has to swap
//! the load on the port, so the sequence is exposed as resumable stages:
//!
//! ```no_run
//! # async fn run(device: &mut nanovna_ctrl::Device) -> nanovna_ctrl::Result<()> {
//! let mut cal = device.one_port_calibration().await?;
//! while let Some(standard) = cal.awaiting() {
//!     println!("Connect {} and press enter", standard);
//!     // wait for the operator here
//!     cal.proceed().await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use tracing::info;

use crate::device::Device;
use crate::proto::command::{CalStep, Command};
use crate::proto::Result;

/// Calibration standard the operator has to attach next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalStandard {
    Open,
    Short,
    Load,
}

impl CalStandard {
    fn step(self) -> CalStep {
        match self {
            CalStandard::Open => CalStep::Open,
            CalStandard::Short => CalStep::Short,
            CalStandard::Load => CalStep::Load,
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            CalStandard::Open => Some(CalStandard::Short),
            CalStandard::Short => Some(CalStandard::Load),
            CalStandard::Load => None,
        }
    }
}

impl fmt::Display for CalStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step().as_str())
    }
}

pub struct OnePortCalibration<'a> {
    device: &'a mut Device,
    awaiting: Option<CalStandard>,
}

impl<'a> OnePortCalibration<'a> {
    /// Switches the current correction off and waits for the open standard.
    pub(crate) async fn begin(device: &'a mut Device) -> Result<OnePortCalibration<'a>> {
        device.calibrate(CalStep::Off).await?;
        Ok(Self {
            device,
            awaiting: Some(CalStandard::Open),
        })
    }

    /// Standard that has to be attached before the next [`proceed`](Self::proceed),
    /// `None` once the calibration is stored and active.
    pub fn awaiting(&self) -> Option<CalStandard> {
        self.awaiting
    }

    pub fn is_complete(&self) -> bool {
        self.awaiting.is_none()
    }

    /// Measures the attached standard. After the load the calibration is
    /// finished and switched on.
    pub async fn proceed(&mut self) -> Result<Option<CalStandard>> {
        let Some(standard) = self.awaiting else {
            return Ok(None);
        };
        self.device.calibrate(standard.step()).await?;
        self.awaiting = standard.next();

        if self.awaiting.is_none() {
            self.device.calibrate(CalStep::Done).await?;
            self.device.calibrate(CalStep::On).await?;
            info!("Calibration completed");
        }
        Ok(self.awaiting)
    }
}

impl Device {
    pub(crate) async fn calibrate(&mut self, step: CalStep) -> Result<()> {
        self.write(Command::Cal(step)).await
    }

    pub async fn one_port_calibration(&mut self) -> Result<OnePortCalibration<'_>> {
        OnePortCalibration::begin(self).await
    }

    /// Runs the whole calibration, asking `ready` before every standard.
    ///
    /// Returns `false` if `ready` declined a stage; the correction then stays
    /// switched off.
    pub async fn perform_1port_cal<F>(&mut self, mut ready: F) -> Result<bool>
    where
        F: FnMut(CalStandard) -> bool,
    {
        let mut cal = self.one_port_calibration().await?;
        while let Some(standard) = cal.awaiting() {
            if !ready(standard) {
                info!("Calibration aborted before {}", standard);
                return Ok(false);
            }
            cal.proceed().await?;
        }
        Ok(true)
    }
}
