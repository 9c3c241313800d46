use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::time::Duration;
use tokio::{signal, time::sleep};
use tracing::{error, info, warn};

use wiener_hv::args::DeviceArgs;
use wiener_hv::logging::setup_logging;
use wiener_hv_lib::{NetSnmp, StatusReporter, VoltageController};

/// Periodically append the crate's voltages and currents to a status log.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Status log to append to.
    #[arg(default_value = "hv_status.log")]
    output: PathBuf,
    #[command(flatten)]
    device: DeviceArgs,
    /// Seconds between status lines.
    #[arg(short, long, default_value_t = 60)]
    interval_secs: u64,
    /// Number of lines to write. Runs until Ctrl+C if omitted.
    #[arg(short, long)]
    count: Option<u32>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    tokio::select! {
        res = run(cli) => {
            if let Err(e) = res {
                error!("Status logger failed: {:?}", e);
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down gracefully.");
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.device.config();
    info!(host = %config.snmp.host, output = ?cli.output, "Starting status logger");
    let hv = VoltageController::new(NetSnmp::new(config.snmp.clone()), config);
    let reporter = StatusReporter::new(&hv);

    let iterations = cli.count.unwrap_or(u32::MAX);
    for i in 0..iterations {
        match reporter.log_status(&cli.output).await {
            Ok(snapshot) => info!("[Line {}] Logged {} channels", i + 1, snapshot.len()),
            // A missed reading is not worth stopping the log for; file errors are.
            Err(e) if e.is_recoverable() => warn!("Skipping status line: {}", e),
            Err(e) => return Err(e).with_context(|| format!("Failed to write to {:?}", cli.output)),
        }
        if i + 1 < iterations {
            sleep(Duration::from_secs(cli.interval_secs)).await;
        }
    }

    info!("Finished logging.");
    Ok(())
}
