use std::time::Duration;
use tracing::{debug, info};

use crate::locator;
use crate::measurement::{
    ComplexSample, FrequencySweep, MeasureOptions, Measurement, PowerLevel, SweepConfig,
};
use crate::proto::{
    command::Command,
    link::Link,
    response::{average, parse_frequencies, parse_samples, strip_prompt},
    transport::{TimeoutPolicy, Transport},
    ProtoError, Result,
};
use crate::{DEFAULT_BAUDRATE, DEFAULT_READ_TIMEOUT};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub baudrate: u32,
    /// Inactivity timeout for every read, fixed for the lifetime of the link.
    pub read_timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
    /// Default for [`MeasureOptions::pause_sweep`] used by [`Device::measure`].
    pub pause_during_measure: bool,
    /// Send `resume` right after connecting.
    pub resume_on_connect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            timeout_policy: TimeoutPolicy::default(),
            pause_during_measure: false,
            resume_on_connect: true,
        }
    }
}

/// Session with one NanoVNA.
pub struct Device {
    transport: Transport,
    config: SessionConfig,
}

impl Device {
    /// Opens `port`, or the first NanoVNA found when `port` is `None`.
    pub async fn connect(port: Option<&str>, config: SessionConfig) -> Result<Self> {
        let port = match port {
            Some(port) => port.to_string(),
            None => locator::find_port()?,
        };
        let link = Link::open(&port, config.baudrate, config.read_timeout)?;
        info!("Connected to device at {}", port);
        Self::with_link(link, config).await
    }

    pub async fn with_link(link: Link, config: SessionConfig) -> Result<Self> {
        let mut device = Self {
            transport: Transport::new(link, config.timeout_policy),
            config,
        };
        if device.config.resume_on_connect {
            device.resume().await?;
        }
        Ok(device)
    }

    #[cfg(test)]
    pub(crate) async fn new_faked(
        fake: &crate::proto::fake::FakeInstrument,
        config: SessionConfig,
    ) -> Result<Self> {
        let link = Link::from_io(fake.clone(), config.read_timeout);
        Self::with_link(link, config).await
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    pub(crate) async fn write(&mut self, cmd: Command) -> Result<()> {
        self.transport.write(cmd).await
    }

    async fn query_text(&mut self, cmd: Command) -> Result<String> {
        let raw = self.transport.query(cmd).await?;
        Ok(strip_prompt(&raw)?.to_string())
    }

    pub async fn info(&mut self) -> Result<String> {
        self.query_text(Command::Info).await
    }

    pub async fn help(&mut self) -> Result<String> {
        self.query_text(Command::Help).await
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.write(Command::Pause).await
    }

    pub async fn resume(&mut self) -> Result<()> {
        self.write(Command::Resume).await
    }

    pub async fn frequencies(&mut self) -> Result<FrequencySweep> {
        let raw = self.transport.query(Command::Frequencies).await?;
        parse_frequencies(strip_prompt(&raw)?)
    }

    /// One S11 read of the current sweep.
    pub async fn data(&mut self) -> Result<Vec<ComplexSample>> {
        let raw = self.transport.query(Command::Data).await?;
        parse_samples(strip_prompt(&raw)?)
    }

    /// Reads the sweep frequencies and `num_avg` averaged S11 sweeps.
    pub async fn measure(&mut self, num_avg: usize) -> Result<Measurement> {
        self.measure_with(MeasureOptions {
            averages: num_avg,
            pause_sweep: self.config.pause_during_measure,
        })
        .await
    }

    pub async fn measure_with(&mut self, options: MeasureOptions) -> Result<Measurement> {
        if options.averages == 0 {
            return Err(ProtoError::EmptyAverage);
        }
        if !options.pause_sweep {
            return self.read_measurement(options.averages).await;
        }

        self.pause().await?;
        let result = self.read_measurement(options.averages).await;
        // Resume even if the read failed, but report the read error first
        let resumed = self.resume().await;
        let measurement = result?;
        resumed?;
        Ok(measurement)
    }

    async fn read_measurement(&mut self, averages: usize) -> Result<Measurement> {
        let frequencies = self.frequencies().await?;
        let mut sets = Vec::with_capacity(averages);
        for _ in 0..averages {
            sets.push(self.data().await?);
        }
        debug!(
            "Averaging {} reads of {} points",
            sets.len(),
            frequencies.len()
        );
        let samples = average(&sets, averages)?;
        Measurement::new(frequencies, samples)
    }

    pub async fn setup_sweep(&mut self, start_hz: u64, stop_hz: u64, points: u32) -> Result<()> {
        let sweep = SweepConfig::new(start_hz, stop_hz, points)?;
        self.write(Command::SetSweep(sweep)).await
    }

    pub async fn sweep(&mut self) -> Result<SweepConfig> {
        self.query_text(Command::GetSweep).await?.parse()
    }

    pub async fn power(&mut self) -> Result<String> {
        self.query_text(Command::GetPower).await
    }

    pub async fn set_power(&mut self, level: PowerLevel) -> Result<()> {
        self.write(Command::SetPower(level)).await
    }

    pub async fn bandwidth(&mut self) -> Result<String> {
        self.query_text(Command::GetBandwidth).await
    }

    /// Sets the IF bandwidth index, see [`crate::measurement::bandwidth_hz`].
    pub async fn set_bandwidth(&mut self, index: u16) -> Result<()> {
        self.write(Command::SetBandwidth(index)).await
    }
}
