use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use wiener_hv_lib::config::{DEFAULT_COMMUNITY, DEFAULT_HOST, HvConfig, StorePaths};

/// How to reach the crate and where its settings files live.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Address of the crate's SNMP agent.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    /// SNMP write community.
    #[arg(long, default_value = DEFAULT_COMMUNITY)]
    pub community: String,
    /// Per-request SNMP timeout in seconds (net-snmp default if omitted).
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// SNMP retries per request (net-snmp default if omitted).
    #[arg(long)]
    pub retries: Option<u32>,
    /// Directory holding HVDefaults.txt and LastUsedHVSettings.txt.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

impl DeviceArgs {
    pub fn config(&self) -> HvConfig {
        let mut config = HvConfig::new(&self.host);
        config.snmp.community = self.community.clone();
        config.snmp.timeout = self.timeout_secs.map(Duration::from_secs);
        config.snmp.retries = self.retries;
        if let Some(dir) = &self.store_dir {
            config.stores = StorePaths::in_dir(dir);
        }
        config
    }
}
