use std::fmt;

use thiserror::Error;

/// Why an exchange was judged out of step with the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desync {
    /// Bytes were still waiting on the link after the exchange finished.
    ResidualBytes(usize),
    /// The position report named a different channel than the one asked for.
    ChannelMismatch { echoed: u8 },
    /// The position report was shorter than a full frame.
    ShortFrame(usize),
}

impl fmt::Display for Desync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Desync::ResidualBytes(n) => write!(f, "{n} unexpected byte(s) left on the link"),
            Desync::ChannelMismatch { echoed } => {
                write!(f, "response echoed channel {echoed}")
            }
            Desync::ShortFrame(n) => write!(f, "response frame only {n} byte(s) long"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageError {
    #[error("channel {0} is not configured")]
    ChannelNotConfigured(u8),
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("protocol desync on channel {channel}: {desync}")]
    ProtocolDesync { channel: u8, desync: Desync },
    #[error(
        "channel {channel}: move to {requested_um:.2} um exceeds position limit of +/-{limit_um:.2} um"
    )]
    LimitExceeded {
        channel: u8,
        requested_um: f64,
        limit_um: f64,
    },
    #[error(
        "channel {channel}: move timed out at {last_counts} counts (target {target_counts})"
    )]
    MoveTimedOut {
        channel: u8,
        target_counts: i32,
        last_counts: i32,
    },
    #[error("transport error on channel {channel}: {detail}")]
    Transport { channel: u8, detail: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("unknown stage model: {0}")]
    UnknownStage(String),
    #[error("channel index {0} out of range (0..=2)")]
    ChannelIndex(usize),
    #[error("no channel has a stage attached")]
    NoActiveChannels,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Typed stage error carried by `err`, if any.
pub fn stage_error(err: &Report) -> Option<&StageError> {
    err.downcast_ref::<StageError>()
}
