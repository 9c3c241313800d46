use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wiener_hv::args::DeviceArgs;
use wiener_hv::logging::setup_logging;
use wiener_hv_lib::config::VOLTAGES_FILE;
use wiener_hv_lib::{
    ChannelStatus, NetSnmp, SetReport, ShutdownOutcome, ShutdownSupervisor, StatusReporter, VoltageController,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_TIMED_OUT: u8 = 2;
const EXIT_CANCELLED: u8 = 3;
const EXIT_UNKNOWN_MODE: u8 = 4;
const EXIT_PARTIAL_WRITE: u8 = 5;

/// Control a Wiener high-voltage crate over SNMP.
///
/// MODE is matched by substring: "on" restores the last-used voltages, "off"
/// saves them and ramps the crate down, "status" prints every channel's
/// voltage and current. "defaults", "last", "save" and "log" snapshot
/// setpoints to HVDefaults.txt, to LastUsedHVSettings.txt, to --file, and
/// append a status line to --status-log respectively.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// One of: on, off, status, defaults, last, save, log.
    mode: String,
    #[command(flatten)]
    device: DeviceArgs,
    /// Settings file for "on" (default: last-used store) and "save" (default: voltages.txt).
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Status log appended to by "log".
    #[arg(long, default_value = "hv_status.log")]
    status_log: PathBuf,
    /// Print "status" as JSON.
    #[arg(long)]
    json: bool,
    /// Milliseconds between ramp-down polls.
    #[arg(long, default_value_t = 2000)]
    poll_interval_ms: u64,
    /// Maximum number of ramp-down polls.
    #[arg(long, default_value_t = 100)]
    max_polls: u32,
    /// Voltage below which the crate is considered safe.
    #[arg(long, default_value_t = 10.0)]
    threshold: f64,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    StartUp,
    ShutDown,
    Status,
    Defaults,
    LastUsed,
    Save,
    Log,
}

impl Mode {
    /// Substring dispatch, checked in this order.
    fn from_arg(arg: &str) -> Option<Self> {
        const MODES: &[(&str, Mode)] = &[
            ("on", Mode::StartUp),
            ("off", Mode::ShutDown),
            ("status", Mode::Status),
            ("defaults", Mode::Defaults),
            ("last", Mode::LastUsed),
            ("save", Mode::Save),
            ("log", Mode::Log),
        ];
        MODES
            .iter()
            .find(|(needle, _)| arg.contains(needle))
            .map(|&(_, mode)| mode)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match setup_logging(cli.log_file.clone(), &cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {:?}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Application failed: {:?}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let Some(mode) = Mode::from_arg(&cli.mode) else {
        error!("Unknown mode {:?}; expected one of on, off, status, defaults, last, save, log", cli.mode);
        return Ok(ExitCode::from(EXIT_UNKNOWN_MODE));
    };

    let mut config = cli.device.config();
    config.poll.interval = Duration::from_millis(cli.poll_interval_ms);
    config.poll.max_polls = cli.max_polls;
    config.poll.threshold = cli.threshold;

    info!(host = %config.snmp.host, ?mode, "Connecting to HV crate");
    let hv = VoltageController::new(NetSnmp::new(config.snmp.clone()), config);

    match mode {
        Mode::StartUp => {
            let report = ShutdownSupervisor::new(&hv)
                .start_up(cli.file.as_deref())
                .await
                .context("Failed to restore voltages")?;
            Ok(exit_for_writes(&report))
        }
        Mode::ShutDown => shut_down(&hv).await,
        Mode::Status => {
            print_status(&hv, cli.json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Defaults => {
            let saved = hv.set_defaults().await.context("Failed to save default voltages")?;
            info!("Saved {} channel defaults to {:?}", saved.len(), hv.config().stores.defaults);
            Ok(ExitCode::SUCCESS)
        }
        Mode::LastUsed => {
            let saved = hv.set_last_used().await.context("Failed to save last-used voltages")?;
            info!("Saved {} channel settings to {:?}", saved.len(), hv.config().stores.last_used);
            Ok(ExitCode::SUCCESS)
        }
        Mode::Save => {
            let path = cli.file.unwrap_or_else(|| PathBuf::from(VOLTAGES_FILE));
            hv.voltages_to_file(&path)
                .await
                .with_context(|| format!("Failed to save voltages to {:?}", path))?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Log => {
            StatusReporter::new(&hv)
                .log_status(&cli.status_log)
                .await
                .with_context(|| format!("Failed to log status to {:?}", cli.status_log))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn shut_down(hv: &VoltageController<NetSnmp>) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, abandoning ramp-down supervision.");
            on_ctrl_c.cancel();
        }
    });

    let report = ShutdownSupervisor::new(hv)
        .shutdown_with_cancel(&cancel)
        .await
        .context("Shutdown failed")?;

    if let Some(e) = &report.persist_error {
        error!(
            "Last-used settings were not saved to {:?}; \"on\" will not restore this state: {}",
            hv.config().stores.last_used, e
        );
    }
    if !report.ramp_down.is_complete() {
        warn!(
            "{} ramp-down write(s) failed; check the crate by hand",
            report.ramp_down.failure_count()
        );
    }

    match report.outcome {
        ShutdownOutcome::Settled => {
            println!("Voltages are down");
            if report.is_persisted() {
                Ok(exit_for_writes(&report.ramp_down))
            } else {
                Ok(ExitCode::from(EXIT_FAILURE))
            }
        }
        ShutdownOutcome::TimedOut => {
            error!(
                "Channel {} still at {:?} V after {} polls; voltages may NOT be down",
                report.watched_channel, report.last_reading, report.polls
            );
            Ok(ExitCode::from(EXIT_TIMED_OUT))
        }
        ShutdownOutcome::Cancelled => Ok(ExitCode::from(EXIT_CANCELLED)),
    }
}

async fn print_status(hv: &VoltageController<NetSnmp>, json: bool) -> Result<()> {
    let snapshot = StatusReporter::new(hv)
        .snapshot()
        .await
        .context("Failed to read crate status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for status in &snapshot {
            println!("{}", status_line(status));
        }
    }
    Ok(())
}

fn status_line(status: &ChannelStatus) -> String {
    format!("Ch:{}, {:.6}V, {:.6}A,", status.channel, status.voltage, status.current)
}

fn exit_for_writes(report: &SetReport) -> ExitCode {
    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        for channel in report.failed_channels() {
            for failure in &channel.failures {
                error!(channel = %channel.channel, parameter = %failure.parameter, "{}", failure.error);
            }
        }
        ExitCode::from(EXIT_PARTIAL_WRITE)
    }
}
