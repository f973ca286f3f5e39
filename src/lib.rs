//!
//! This library provides communication with a NanoVNA vector network analyzer.
//!
//! <br>
//!
//! # Details
//!
//! - The NanoVNA shows up as a USB virtual COM port (VID 0x0483, PID 0x5740).
//!   Leave out the port to pick it automatically.
//!
//! - Basic setup and measurement
//!
//!   ```no_run
//!   use nanovna_ctrl::{Device, SessionConfig};
//!   #[tokio::main]
//!   async fn main() -> nanovna_ctrl::Result<()> {
//!       let mut device = Device::connect(None, SessionConfig::default()).await?;
//!       device.setup_sweep(1_000_000, 30_000_000, 101).await?;
//!       let s11 = device.measure(4).await?;
//!       for (f, s) in s11.points() {
//!           println!("{} Hz: {:.2} dB", f, s.magnitude_db());
//!       }
//!       device.close().await?;
//!       Ok(())
//!   }
//!   ```
//!
//! # Supported devices
//!
//!  * NanoVNA (original and -H/-H4 variants running the stock shell)
//!

use std::time::Duration;

pub mod calibration;
pub mod device;
pub mod locator;
pub mod measurement;
pub mod proto;

pub use calibration::{CalStandard, OnePortCalibration};
pub use device::{Device, SessionConfig};
pub use measurement::{ComplexSample, FrequencySweep, Measurement, PowerLevel, SweepConfig};
pub use proto::{ProtoError, Result};

/// Baudrate for the virtual COM port. The USB CDC link ignores it.
pub const DEFAULT_BAUDRATE: u32 = 115200;

/// Inactivity timeout applied to every read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);
