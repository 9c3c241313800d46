//! Line-oriented persistence of voltage configurations.
//!
//! Each record is `<channel> <voltage>` on its own line. Older files written
//! by the crate tools used bare `\r` separators and full parameter names
//! (`outputVoltage.u3 1500.000000`); both are accepted on load.

use crate::channel::ChannelId;
use crate::error::{HvError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The literal target value that switches a channel off.
pub const OFF_VOLTAGE: &str = "0";

/// A channel's target voltage, kept as decimal text so it round-trips exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoltageSetting {
    pub channel: ChannelId,
    pub voltage: String,
}

impl VoltageSetting {
    pub fn new(channel: impl Into<ChannelId>, voltage: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            voltage: voltage.into(),
        }
    }

    /// Setting that ramps `channel` to zero and switches it off.
    pub fn off(channel: ChannelId) -> Self {
        Self {
            channel,
            voltage: OFF_VOLTAGE.to_string(),
        }
    }

    /// Only the literal `"0"` means off; `"0.0"` still switches the output on.
    pub fn is_off(&self) -> bool {
        self.voltage == OFF_VOLTAGE
    }
}

/// Write `settings` to `path`, one record per line, replacing any existing file.
pub fn save(path: impl AsRef<Path>, settings: &[VoltageSetting]) -> Result<()> {
    let path = path.as_ref();
    let mut contents = String::with_capacity(settings.len() * 16);
    for setting in settings {
        contents.push_str(setting.channel.as_str());
        contents.push(' ');
        contents.push_str(&setting.voltage);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    info!("Saved {} channel settings to {}", settings.len(), path.display());
    Ok(())
}

/// Read a configuration previously written by [`save`].
pub fn load(path: impl AsRef<Path>) -> Result<Vec<VoltageSetting>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let settings = parse_records(&contents)?;
    debug!("Loaded {} channel settings from {}", settings.len(), path.display());
    Ok(settings)
}

/// Parse store contents. Any malformed line fails the whole parse.
pub fn parse_records(contents: &str) -> Result<Vec<VoltageSetting>> {
    let contents = contents.replace("\r\n", "\n");
    let mut settings = Vec::new();
    for (index, line) in contents.split(['\n', '\r']).enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(channel), Some(voltage), None) => {
                settings.push(VoltageSetting::new(ChannelId::from_parameter(channel), voltage));
            }
            _ => {
                return Err(HvError::MalformedRecord {
                    line: index + 1,
                    content: line.to_string(),
                });
            }
        }
    }
    Ok(settings)
}

/// Fail with [`HvError::UnknownChannel`] for the first setting whose channel
/// is not in `known`.
pub fn verify_channels(settings: &[VoltageSetting], known: &[ChannelId]) -> Result<()> {
    let known: HashSet<&ChannelId> = known.iter().collect();
    match settings.iter().find(|s| !known.contains(&s.channel)) {
        Some(setting) => Err(HvError::UnknownChannel(setting.channel.clone())),
        None => Ok(()),
    }
}
