//! Device-facing vocabulary: channel ids, crate parameters and the
//! [`DeviceChannel`] trait every transport implements.
//!
//! The controller only ever talks to the crate through three operations:
//!
//! - **enumerate**: walk one parameter across every channel,
//! - **read**: fetch one parameter of one channel,
//! - **write**: set one parameter of one channel to a typed value.
//!
//! Whether these are carried over SNMP, a REST bridge or a serial link is the
//! adapter's business. [`crate::snmp::NetSnmp`] is the SNMP implementation.

use crate::error::Result;
use async_trait::async_trait;
use num_enum::IntoPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum_macros::Display;

/// Opaque channel identifier as used by the crate (`"0"`, `"100"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Strip a `baseName.u<channel>` parameter prefix, leaving `<channel>`.
    ///
    /// Tokens without the prefix are taken as the channel id unchanged.
    pub fn from_parameter(raw: &str) -> Self {
        match raw.split_once(".u") {
            Some((_, channel)) => Self(channel.to_string()),
            None => Self(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-channel crate parameters, named as in `WIENER-CRATE-MIB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Parameter {
    #[strum(serialize = "outputName")]
    Name,
    #[strum(serialize = "outputVoltage")]
    TargetVoltage,
    #[strum(serialize = "outputVoltageRiseRate")]
    RiseRate,
    #[strum(serialize = "outputSwitch")]
    Switch,
    #[strum(serialize = "outputMeasurementSenseVoltage")]
    SenseVoltage,
    #[strum(serialize = "outputMeasurementCurrent")]
    Current,
}

impl Parameter {
    /// The per-channel object name, e.g. `outputSwitch.u3`.
    pub fn for_channel(&self, channel: &ChannelId) -> String {
        format!("{}.u{}", self, channel)
    }
}

/// Output switch position. The numeric value is what the crate expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive)]
#[repr(u8)]
pub enum SwitchState {
    #[strum(to_string = "off")]
    Off = 0,
    #[strum(to_string = "on")]
    On = 1,
}

/// A typed value for [`DeviceChannel::write`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// Decimal text, passed through verbatim.
    Float(String),
    Integer(i64),
}

impl From<SwitchState> for WriteValue {
    fn from(state: SwitchState) -> Self {
        WriteValue::Integer(u8::from(state) as i64)
    }
}

impl fmt::Display for WriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteValue::Float(text) => f.write_str(text),
            WriteValue::Integer(value) => write!(f, "{}", value),
        }
    }
}

/// Transport to a high-voltage crate.
///
/// Any error returned is treated by callers as a recoverable
/// [`crate::HvError::DeviceCommunication`]: logged, never fatal for a batch.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Walk `parameter` across all channels, in device order.
    async fn enumerate(&self, parameter: Parameter) -> Result<Vec<(ChannelId, String)>>;

    /// Read `parameter` for a single channel.
    async fn read(&self, parameter: Parameter, channel: &ChannelId) -> Result<String>;

    /// Write `value` to `parameter` of a single channel.
    async fn write(&self, parameter: Parameter, channel: &ChannelId, value: WriteValue) -> Result<()>;
}

#[async_trait]
impl<T: DeviceChannel + ?Sized> DeviceChannel for Arc<T> {
    async fn enumerate(&self, parameter: Parameter) -> Result<Vec<(ChannelId, String)>> {
        (**self).enumerate(parameter).await
    }

    async fn read(&self, parameter: Parameter, channel: &ChannelId) -> Result<String> {
        (**self).read(parameter, channel).await
    }

    async fn write(&self, parameter: Parameter, channel: &ChannelId, value: WriteValue) -> Result<()> {
        (**self).write(parameter, channel, value).await
    }
}
