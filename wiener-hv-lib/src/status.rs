//! Voltage/current snapshots and the append-only status log.

use crate::channel::{ChannelId, DeviceChannel};
use crate::controller::VoltageController;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// One channel's readings at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub voltage: f64,
    pub current: f64,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.channel, self.voltage, self.current)
    }
}

pub struct StatusReporter<'a, D> {
    controller: &'a VoltageController<D>,
}

impl<'a, D: DeviceChannel> StatusReporter<'a, D> {
    pub fn new(controller: &'a VoltageController<D>) -> Self {
        Self { controller }
    }

    /// Fresh voltage and current readings for every channel.
    ///
    /// Currents are joined to voltages by channel id, so the two walks may
    /// come back in different orders. A channel with no current reading is
    /// left out.
    pub async fn snapshot(&self) -> Result<Vec<ChannelStatus>> {
        let voltages = self.controller.read_voltages(None).await?;
        let currents: HashMap<ChannelId, f64> = self
            .controller
            .read_currents(None)
            .await?
            .into_iter()
            .map(|r| (r.channel, r.value))
            .collect();

        let mut snapshot = Vec::with_capacity(voltages.len());
        for reading in voltages {
            match currents.get(&reading.channel) {
                Some(&current) => snapshot.push(ChannelStatus {
                    channel: reading.channel,
                    voltage: reading.value,
                    current,
                }),
                None => warn!(channel = %reading.channel, "No current reading, leaving channel out of snapshot"),
            }
        }
        Ok(snapshot)
    }

    /// Take a snapshot and append it to `path`, stamped with the current time.
    pub async fn log_status(&self, path: impl AsRef<Path>) -> Result<Vec<ChannelStatus>> {
        let snapshot = self.snapshot().await?;
        append_log(path, &snapshot, Utc::now())?;
        Ok(snapshot)
    }
}

/// Format one log line: `<unix_timestamp>\t(ch, v, i)\t...\n`.
pub fn format_log_line(snapshot: &[ChannelStatus], timestamp: DateTime<Utc>) -> String {
    let mut line = format!("{}.{:06}", timestamp.timestamp(), timestamp.timestamp_subsec_micros());
    for status in snapshot {
        line.push('\t');
        line.push_str(&status.to_string());
    }
    line.push('\n');
    line
}

/// Append one line for `snapshot` to `path`, creating the file if needed.
pub fn append_log(path: impl AsRef<Path>, snapshot: &[ChannelStatus], timestamp: DateTime<Utc>) -> Result<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format_log_line(snapshot, timestamp).as_bytes())?;
    debug!(channels = snapshot.len(), "Appended status line to {}", path.display());
    Ok(())
}
