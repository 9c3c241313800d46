use crate::channel::{ChannelId, DeviceChannel, Parameter, SwitchState, WriteValue};
use crate::config::HvConfig;
use crate::error::{HvError, Result};
use crate::store::{self, VoltageSetting};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// A single live measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    pub channel: ChannelId,
    pub value: f64,
}

/// A write that the device did not acknowledge.
#[derive(Debug)]
pub struct WriteFailure {
    pub parameter: Parameter,
    pub error: HvError,
}

/// Result of applying one [`VoltageSetting`].
#[derive(Debug)]
pub struct ChannelWriteOutcome {
    pub channel: ChannelId,
    pub switch: SwitchState,
    pub failures: Vec<WriteFailure>,
}

impl ChannelWriteOutcome {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-channel results of [`VoltageController::set_voltages`], in input order.
#[derive(Debug, Default)]
pub struct SetReport {
    pub channels: Vec<ChannelWriteOutcome>,
}

impl SetReport {
    /// True when every write of every channel was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.channels.iter().all(ChannelWriteOutcome::is_ok)
    }

    pub fn failed_channels(&self) -> impl Iterator<Item = &ChannelWriteOutcome> {
        self.channels.iter().filter(|c| !c.is_ok())
    }

    pub fn failure_count(&self) -> usize {
        self.channels.iter().map(|c| c.failures.len()).sum()
    }
}

/// Applies setpoints to the crate and reads measurements back.
///
/// Holds no state of its own beyond the configuration; the crate is the only
/// source of truth for live values.
pub struct VoltageController<D> {
    device: D,
    config: HvConfig,
}

impl<D: DeviceChannel> VoltageController<D> {
    pub fn new(device: D, config: HvConfig) -> Self {
        Self { device, config }
    }

    pub fn config(&self) -> &HvConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Apply `targets` in order: ramp rate, then target voltage, then switch.
    ///
    /// A failed write is logged and recorded in the report; the remaining
    /// writes and channels are still attempted.
    pub async fn set_voltages(&self, targets: &[VoltageSetting]) -> SetReport {
        let mut report = SetReport::default();
        for target in targets {
            let switch = if target.is_off() { SwitchState::Off } else { SwitchState::On };
            info!(channel = %target.channel, voltage = %target.voltage, %switch, "Applying setpoint");

            let writes = [
                (Parameter::RiseRate, WriteValue::Float(self.config.ramp_rate.clone())),
                (Parameter::TargetVoltage, WriteValue::Float(target.voltage.clone())),
                (Parameter::Switch, WriteValue::from(switch)),
            ];

            let mut failures = Vec::new();
            for (parameter, value) in writes {
                if let Err(error) = self.device.write(parameter, &target.channel, value).await {
                    warn!(channel = %target.channel, %parameter, "Write failed: {}", error);
                    failures.push(WriteFailure { parameter, error });
                }
            }

            report.channels.push(ChannelWriteOutcome {
                channel: target.channel.clone(),
                switch,
                failures,
            });
        }

        if !report.is_complete() {
            warn!(
                "{} write(s) failed across {} channel(s)",
                report.failure_count(),
                report.failed_channels().count()
            );
        }
        report
    }

    /// All channel ids, in device order.
    pub async fn channels(&self) -> Result<Vec<ChannelId>> {
        let names = self.device.enumerate(Parameter::Name).await?;
        Ok(names.into_iter().map(|(channel, _)| channel).collect())
    }

    /// Measured sense voltages. `None` walks the whole crate.
    pub async fn read_voltages(&self, channels: Option<&[ChannelId]>) -> Result<Vec<ChannelReading>> {
        self.read_measurement(Parameter::SenseVoltage, channels).await
    }

    /// Measured output currents. `None` walks the whole crate.
    pub async fn read_currents(&self, channels: Option<&[ChannelId]>) -> Result<Vec<ChannelReading>> {
        self.read_measurement(Parameter::Current, channels).await
    }

    /// Measured sense voltage of one channel.
    pub async fn read_voltage(&self, channel: &ChannelId) -> Result<f64> {
        let text = self.device.read(Parameter::SenseVoltage, channel).await?;
        parse_measurement(Parameter::SenseVoltage, channel, &text)
    }

    async fn read_measurement(
        &self,
        parameter: Parameter,
        channels: Option<&[ChannelId]>,
    ) -> Result<Vec<ChannelReading>> {
        match channels {
            None => self.read_all(parameter).await,
            Some(channels) => Ok(self.read_scoped(parameter, channels).await),
        }
    }

    // Channel order comes from the name walk; values are matched by id.
    async fn read_all(&self, parameter: Parameter) -> Result<Vec<ChannelReading>> {
        let channels = self.channels().await?;
        let values: HashMap<ChannelId, String> = self.device.enumerate(parameter).await?.into_iter().collect();

        let mut readings = Vec::with_capacity(channels.len());
        for channel in channels {
            let Some(text) = values.get(&channel) else {
                warn!(%channel, %parameter, "Channel missing from walk, skipping");
                continue;
            };
            match parse_measurement(parameter, &channel, text) {
                Ok(value) => readings.push(ChannelReading { channel, value }),
                Err(e) => warn!(%channel, "Skipping channel: {}", e),
            }
        }
        debug!(%parameter, count = readings.len(), "Read all channels");
        Ok(readings)
    }

    async fn read_scoped(&self, parameter: Parameter, channels: &[ChannelId]) -> Vec<ChannelReading> {
        let mut readings = Vec::with_capacity(channels.len());
        for channel in channels {
            let value = match self.device.read(parameter, channel).await {
                Ok(text) => parse_measurement(parameter, channel, &text),
                Err(e) => Err(e),
            };
            match value {
                Ok(value) => readings.push(ChannelReading {
                    channel: channel.clone(),
                    value,
                }),
                Err(e) => warn!(%channel, "Skipping channel: {}", e),
            }
        }
        readings
    }

    /// Current target voltages of every channel, as reported by the crate.
    pub async fn read_setpoints(&self) -> Result<Vec<VoltageSetting>> {
        let setpoints = self.device.enumerate(Parameter::TargetVoltage).await?;
        Ok(setpoints
            .into_iter()
            .map(|(channel, voltage)| VoltageSetting { channel, voltage })
            .collect())
    }

    /// Save the crate's current setpoints to `path`.
    pub async fn voltages_to_file(&self, path: impl AsRef<Path>) -> Result<Vec<VoltageSetting>> {
        let setpoints = self.read_setpoints().await?;
        store::save(path, &setpoints)?;
        Ok(setpoints)
    }

    /// Snapshot the current setpoints as the operator-approved defaults.
    pub async fn set_defaults(&self) -> Result<Vec<VoltageSetting>> {
        self.voltages_to_file(&self.config.stores.defaults).await
    }

    /// Snapshot the current setpoints as the last-used configuration.
    pub async fn set_last_used(&self) -> Result<Vec<VoltageSetting>> {
        self.voltages_to_file(&self.config.stores.last_used).await
    }
}

fn parse_measurement(parameter: Parameter, channel: &ChannelId, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        HvError::device(
            format!("read {}", parameter.for_channel(channel)),
            format!("unparseable value {text:?}"),
        )
    })
}
