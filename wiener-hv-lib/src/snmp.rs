//! [`DeviceChannel`] over the net-snmp command line tools.
//!
//! Each operation spawns one of `snmpwalk`, `snmpget` or `snmpset` against
//! the `WIENER-CRATE-MIB`. Walks and gets run with `-Oqs`, which prints one
//! `<parameter>.u<channel> <value> [unit]` line per object.

use crate::channel::{ChannelId, DeviceChannel, Parameter, WriteValue};
use crate::config::SnmpConfig;
use crate::error::{HvError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, warn};

static OBJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<parameter>[A-Za-z][A-Za-z0-9]*)\.u(?P<channel>\S+)\s+(?P<value>\S+)")
        .expect("object line pattern is valid")
});

const MISSING_OBJECT_MARKERS: &[&str] = &["No Such Object", "No Such Instance", "No more variables"];

/// SNMP v2c access to a crate through `snmpwalk`/`snmpget`/`snmpset`.
#[derive(Debug, Clone)]
pub struct NetSnmp {
    config: SnmpConfig,
}

impl NetSnmp {
    pub fn new(config: SnmpConfig) -> Self {
        Self { config }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn command(&self, tool: &str, quiet_output: bool) -> Command {
        let mut cmd = Command::new(tool);
        if quiet_output {
            cmd.arg("-Oqs");
        }
        cmd.args(["-v", "2c", "-m", &self.config.mib, "-c", &self.config.community]);
        if let Some(timeout) = self.config.timeout {
            cmd.arg("-t").arg(format!("{}", timeout.as_secs_f64()));
        }
        if let Some(retries) = self.config.retries {
            cmd.arg("-r").arg(retries.to_string());
        }
        cmd.arg(&self.config.host);
        cmd
    }

    async fn run(&self, mut cmd: Command, operation: &str) -> Result<String> {
        debug!(%operation, host = %self.config.host, "SNMP request");
        let output = cmd.output().await.map_err(|e| {
            warn!(%operation, "Failed to spawn net-snmp tool: {}", e);
            HvError::device(operation, format!("cannot run net-snmp tool: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(%operation, status = %output.status, "SNMP request failed: {}", stderr);
            return Err(HvError::device(operation, stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(%operation, response = %stdout.trim(), "SNMP response");
        Ok(stdout)
    }
}

/// Parse `-Oqs` output into `(channel, value)` pairs, keeping device order.
pub fn parse_objects(output: &str, operation: &str) -> Result<Vec<(ChannelId, String)>> {
    let mut objects = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if MISSING_OBJECT_MARKERS.iter().any(|marker| line.contains(marker)) {
            return Err(HvError::device(operation, line));
        }
        let caps = OBJECT_LINE
            .captures(line)
            .ok_or_else(|| HvError::device(operation, format!("unparseable response line: {line:?}")))?;
        objects.push((ChannelId::new(&caps["channel"]), caps["value"].to_string()));
    }
    Ok(objects)
}

#[async_trait]
impl DeviceChannel for NetSnmp {
    async fn enumerate(&self, parameter: Parameter) -> Result<Vec<(ChannelId, String)>> {
        let operation = format!("walk {}", parameter);
        let mut cmd = self.command("snmpwalk", true);
        cmd.arg(parameter.to_string());
        let stdout = self.run(cmd, &operation).await?;
        parse_objects(&stdout, &operation)
    }

    async fn read(&self, parameter: Parameter, channel: &ChannelId) -> Result<String> {
        let object = parameter.for_channel(channel);
        let operation = format!("get {}", object);
        let mut cmd = self.command("snmpget", true);
        cmd.arg(&object);
        let stdout = self.run(cmd, &operation).await?;
        parse_objects(&stdout, &operation)?
            .into_iter()
            .next()
            .map(|(_, value)| value)
            .ok_or_else(|| HvError::device(&operation, "empty response"))
    }

    async fn write(&self, parameter: Parameter, channel: &ChannelId, value: WriteValue) -> Result<()> {
        let object = parameter.for_channel(channel);
        let type_code = match value {
            WriteValue::Float(_) => "F",
            WriteValue::Integer(_) => "i",
        };
        let operation = format!("set {} {} {}", object, type_code, value);
        let mut cmd = self.command("snmpset", false);
        cmd.arg(&object).arg(type_code).arg(value.to_string());
        self.run(cmd, &operation).await?;
        Ok(())
    }
}
