//! Supervised ramp-down and restore of the whole crate.
//!
//! A shutdown walks through these phases:
//!
//! ```text
//! Idle -> Persisting -> RampingDown -> Polling -> SettledOrTimedOut -> Idle
//! ```
//!
//! - **Persisting**: the current setpoints go to the last-used store so a
//!   later [`ShutdownSupervisor::start_up`] restores exactly this state. A
//!   failure here is recorded in the report and the ramp-down goes ahead.
//! - **RampingDown**: every channel is set to `0` and switched off.
//! - **Polling**: the sense voltage of the last enumerated channel is polled
//!   until it drops below the threshold or the poll budget runs out. Only one
//!   channel is watched, on the assumption that all channels ramp together.
//! - **SettledOrTimedOut**: the outcome is reported. A timeout is a distinct
//!   [`ShutdownOutcome::TimedOut`], never folded into success.

use crate::channel::{ChannelId, DeviceChannel};
use crate::controller::{SetReport, VoltageController};
use crate::error::{HvError, Result};
use crate::store::{self, VoltageSetting};
use std::path::Path;
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default)]
pub enum ShutdownPhase {
    #[default]
    Idle,
    Persisting,
    RampingDown,
    Polling,
    SettledOrTimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ShutdownOutcome {
    /// The watched channel read below the threshold.
    Settled,
    /// The poll budget ran out first.
    TimedOut,
    /// The cancellation token fired while polling.
    Cancelled,
}

#[derive(Debug)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    /// The channel whose voltage was polled.
    pub watched_channel: ChannelId,
    pub polls: u32,
    pub last_reading: Option<f64>,
    /// Setpoints persisted before ramping down. Empty if persisting failed.
    pub saved: Vec<VoltageSetting>,
    /// Why the last-used settings could not be saved, if they weren't.
    pub persist_error: Option<HvError>,
    pub ramp_down: SetReport,
}

impl ShutdownReport {
    pub fn is_settled(&self) -> bool {
        self.outcome == ShutdownOutcome::Settled
    }

    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }

    /// Treat anything but [`ShutdownOutcome::Settled`] as an error.
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            ShutdownOutcome::Settled => Ok(self),
            ShutdownOutcome::TimedOut => Err(HvError::ShutdownTimeout {
                channel: self.watched_channel,
                polls: self.polls,
                last_reading: self.last_reading,
            }),
            ShutdownOutcome::Cancelled => Err(HvError::Cancelled { polls: self.polls }),
        }
    }
}

pub struct ShutdownSupervisor<'a, D> {
    controller: &'a VoltageController<D>,
    phase: ShutdownPhase,
}

impl<'a, D: DeviceChannel> ShutdownSupervisor<'a, D> {
    pub fn new(controller: &'a VoltageController<D>) -> Self {
        Self {
            controller,
            phase: ShutdownPhase::Idle,
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    fn enter(&mut self, phase: ShutdownPhase) {
        info!(from = %self.phase, to = %phase, "Shutdown phase change");
        self.phase = phase;
    }

    /// Ramp the crate down and wait for it to settle.
    pub async fn shutdown(&mut self) -> Result<ShutdownReport> {
        self.shutdown_with_cancel(&CancellationToken::new()).await
    }

    /// As [`Self::shutdown`], stopping the poll loop early if `cancel` fires.
    ///
    /// Cancellation only interrupts polling; the ramp-down writes have
    /// already been issued by then.
    pub async fn shutdown_with_cancel(&mut self, cancel: &CancellationToken) -> Result<ShutdownReport> {
        let result = self.run_shutdown(cancel).await;
        if let Err(e) = &result {
            warn!("Shutdown aborted in phase {}: {}", self.phase, e);
        }
        self.enter(ShutdownPhase::Idle);
        result
    }

    async fn run_shutdown(&mut self, cancel: &CancellationToken) -> Result<ShutdownReport> {
        let poll = self.controller.config().poll.clone();

        self.enter(ShutdownPhase::Persisting);
        let channels = self.controller.channels().await?;
        let watched_channel = channels.last().cloned().ok_or(HvError::NoChannels)?;
        let (saved, persist_error) = match self.controller.set_last_used().await {
            Ok(saved) => (saved, None),
            Err(e) => {
                error!(
                    path = ?self.controller.config().stores.last_used,
                    "Could not save last-used settings, ramping down anyway: {}", e
                );
                (Vec::new(), Some(e))
            }
        };

        self.enter(ShutdownPhase::RampingDown);
        let targets: Vec<VoltageSetting> = channels.into_iter().map(VoltageSetting::off).collect();
        let ramp_down = self.controller.set_voltages(&targets).await;

        self.enter(ShutdownPhase::Polling);
        let mut outcome = ShutdownOutcome::TimedOut;
        let mut polls = 0;
        let mut last_reading = None;
        while polls < poll.max_polls {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome = ShutdownOutcome::Cancelled;
                    break;
                }
                _ = tokio::time::sleep(poll.interval) => {}
            }
            polls += 1;

            match self.controller.read_voltage(&watched_channel).await {
                Ok(voltage) => {
                    info!(poll = polls, channel = %watched_channel, voltage, "Ramping down...");
                    last_reading = Some(voltage);
                    if voltage < poll.threshold {
                        outcome = ShutdownOutcome::Settled;
                        break;
                    }
                }
                Err(e) => warn!(poll = polls, channel = %watched_channel, "Poll read failed: {}", e),
            }
        }

        self.enter(ShutdownPhase::SettledOrTimedOut);
        match outcome {
            ShutdownOutcome::Settled => info!(polls, "Voltages are down"),
            ShutdownOutcome::TimedOut => warn!(
                polls,
                channel = %watched_channel,
                ?last_reading,
                threshold = poll.threshold,
                "Voltages did not fall below threshold before the poll budget ran out"
            ),
            ShutdownOutcome::Cancelled => warn!(polls, "Shutdown polling cancelled"),
        }

        Ok(ShutdownReport {
            outcome,
            watched_channel,
            polls,
            last_reading,
            saved,
            persist_error,
            ramp_down,
        })
    }

    /// Restore a persisted configuration, by default the last-used one.
    ///
    /// The whole file is parsed and checked against the crate's channels
    /// before anything is written.
    pub async fn start_up(&self, path: Option<&Path>) -> Result<SetReport> {
        let path = path.unwrap_or(self.controller.config().stores.last_used.as_path());
        info!("Loading voltages from file: {}", path.display());
        let settings = store::load(path)?;
        let known = self.controller.channels().await?;
        store::verify_channels(&settings, &known)?;
        Ok(self.controller.set_voltages(&settings).await)
    }
}
