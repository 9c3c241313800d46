//! Explicit configuration handed to each component at construction.
//!
//! Defaults reproduce the crate's historical behaviour: community `guru`,
//! ramp rate 100, a poll every 2 s for at most 100 polls and a 10 V
//! safety threshold.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "10.10.0.1";
pub const DEFAULT_COMMUNITY: &str = "guru";
pub const DEFAULT_MIB: &str = "+WIENER-CRATE-MIB";
pub const DEFAULT_RAMP_RATE: &str = "100";

pub const DEFAULTS_FILE: &str = "HVDefaults.txt";
pub const LAST_USED_FILE: &str = "LastUsedHVSettings.txt";
pub const VOLTAGES_FILE: &str = "voltages.txt";

#[derive(Debug, Clone, PartialEq)]
pub struct HvConfig {
    pub snmp: SnmpConfig,
    pub poll: PollConfig,
    pub stores: StorePaths,
    /// Written to `outputVoltageRiseRate` before every setpoint.
    pub ramp_rate: String,
}

impl HvConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            snmp: SnmpConfig::new(host),
            ..Self::default()
        }
    }
}

impl Default for HvConfig {
    fn default() -> Self {
        Self {
            snmp: SnmpConfig::new(DEFAULT_HOST),
            poll: PollConfig::default(),
            stores: StorePaths::default(),
            ramp_rate: DEFAULT_RAMP_RATE.to_string(),
        }
    }
}

/// Settings for the net-snmp command line tools.
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpConfig {
    pub host: String,
    pub community: String,
    pub mib: String,
    /// Passed as `-t`. `None` keeps the net-snmp default.
    pub timeout: Option<Duration>,
    /// Passed as `-r`. `None` keeps the net-snmp default.
    pub retries: Option<u32>,
}

impl SnmpConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            community: DEFAULT_COMMUNITY.to_string(),
            mib: DEFAULT_MIB.to_string(),
            timeout: None,
            retries: None,
        }
    }
}

/// Ramp-down supervision parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_polls: u32,
    /// Readings strictly below this are considered safe.
    pub threshold: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 100,
            threshold: 10.0,
        }
    }
}

/// Locations of the persisted voltage configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct StorePaths {
    pub defaults: PathBuf,
    pub last_used: PathBuf,
}

impl StorePaths {
    /// Both stores under `dir`, with their usual file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            defaults: dir.join(DEFAULTS_FILE),
            last_used: dir.join(LAST_USED_FILE),
        }
    }
}

impl Default for StorePaths {
    fn default() -> Self {
        Self {
            defaults: PathBuf::from(DEFAULTS_FILE),
            last_used: PathBuf::from(LAST_USED_FILE),
        }
    }
}
