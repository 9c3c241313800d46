use crate::channel::ChannelId;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HvError>;

/// The primary error type for the `wiener-hv-lib` library.
#[derive(Error, Debug)]
pub enum HvError {
    #[error("Device communication failed during {operation}: {message}")]
    DeviceCommunication { operation: String, message: String },

    #[error("Malformed record on line {line}: {content:?}")]
    MalformedRecord { line: usize, content: String },

    #[error("Channel {0} does not exist on the device")]
    UnknownChannel(ChannelId),

    #[error("The device reported no channels")]
    NoChannels,

    #[error(
        "Channel {channel} did not fall below threshold after {polls} polls (last reading: {last_reading:?})"
    )]
    ShutdownTimeout {
        channel: ChannelId,
        polls: u32,
        last_reading: Option<f64>,
    },

    #[error("Shutdown cancelled after {polls} polls")]
    Cancelled { polls: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HvError {
    pub(crate) fn device(operation: impl Into<String>, message: impl Into<String>) -> Self {
        HvError::DeviceCommunication {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// True for failures a batch operation should log and step over.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HvError::DeviceCommunication { .. })
    }
}
