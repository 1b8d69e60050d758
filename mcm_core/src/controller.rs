//! The motion controller (`StageController`).
//!
//! Owns the transport and all three channel records. Every exchange is a
//! write followed by at most one fixed-size read, after which the link must
//! be empty. Completion of a move is detected by polling the encoder through
//! `refresh`, paced by the injected clock.

use std::sync::Arc;
use std::time::Duration;

use mcm_traits::Transport;
use mcm_traits::clock::Clock;
use mcm_traits::protocol::{CHANNEL_COUNT, POSITION_RESPONSE_LEN};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelConfig, ChannelRuntime};
use crate::codec::{Command, decode_position};
use crate::config::MotionCfg;
use crate::error::{Desync, Result, StageError};
use crate::hw_error::map_transport_error;
use crate::status::MoveOutcome;
use crate::units::UnitConverter;

/// Log a "still waiting" warning this often while zeroing.
const ZERO_WAIT_WARN_EVERY: u64 = 10_000;

pub struct StageController<T: Transport> {
    pub(crate) transport: T,
    pub(crate) name: String,
    pub(crate) channels: [ChannelConfig; CHANNEL_COUNT],
    pub(crate) runtime: [ChannelRuntime; CHANNEL_COUNT],
    pub(crate) motion: MotionCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
}

impl<T: Transport> core::fmt::Debug for StageController<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StageController")
            .field("name", &self.name)
            .field("channels", &self.channels)
            .field("runtime", &self.runtime)
            .field("motion", &self.motion)
            .finish()
    }
}

impl<T: Transport> StageController<T> {
    /// Display name used in log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indices of channels with a stage attached.
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.channels
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.index)
    }

    pub fn channel_config(&self, channel: u8) -> Option<&ChannelConfig> {
        self.channels.get(usize::from(channel))
    }

    /// Cached state of a channel; performs no I/O.
    pub fn channel_runtime(&self, channel: u8) -> Option<&ChannelRuntime> {
        self.runtime.get(usize::from(channel))
    }

    pub fn motion_cfg(&self) -> &MotionCfg {
        &self.motion
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn converter(&self, channel: u8) -> Result<UnitConverter> {
        self.channels
            .get(usize::from(channel))
            .and_then(ChannelConfig::converter)
            .ok_or_else(|| eyre::Report::new(StageError::ChannelNotConfigured(channel)))
    }

    /// One half-duplex exchange. Returns the reply when the command has one.
    fn exchange(&mut self, cmd: Command) -> Result<Option<[u8; POSITION_RESPONSE_LEN]>> {
        let channel = cmd.channel();
        let frame = cmd.encode();
        trace!(device = %self.name, channel, ?cmd, frame = ?frame, "sending");
        self.transport
            .write_all(&frame)
            .map_err(|e| eyre::Report::new(map_transport_error(channel, &*e)))?;

        let reply = match cmd.response_len() {
            Some(_) => {
                let mut buf = [0u8; POSITION_RESPONSE_LEN];
                self.transport
                    .read_exact(&mut buf)
                    .map_err(|e| eyre::Report::new(map_transport_error(channel, &*e)))?;
                trace!(device = %self.name, channel, reply = ?buf, "received");
                Some(buf)
            }
            None => None,
        };

        let pending = self
            .transport
            .bytes_pending()
            .map_err(|e| eyre::Report::new(map_transport_error(channel, &*e)))?;
        if pending != 0 {
            warn!(device = %self.name, channel, pending, "residual bytes after exchange");
            return Err(eyre::Report::new(StageError::ProtocolDesync {
                channel,
                desync: Desync::ResidualBytes(pending),
            }));
        }
        Ok(reply)
    }

    /// Read the encoder and update the channel's cached counts and position.
    ///
    /// This is the only path that refreshes runtime state. On a desync the
    /// cached values are left as they were.
    pub fn refresh(&mut self, channel: u8) -> Result<i32> {
        let conv = self.converter(channel)?;
        let reply = self
            .exchange(Command::ReadPosition { channel })?
            .ok_or_else(|| {
                eyre::Report::new(StageError::ProtocolDesync {
                    channel,
                    desync: Desync::ShortFrame(0),
                })
            })?;
        let counts = decode_position(channel, &reply)
            .map_err(|desync| eyre::Report::new(StageError::ProtocolDesync { channel, desync }))?;
        let rt = &mut self.runtime[usize::from(channel)];
        rt.record(counts, &conv);
        trace!(device = %self.name, channel, counts, um = rt.last_position_um, "encoder read");
        Ok(counts)
    }

    /// Current position in micrometers (reads the device).
    pub fn position_um(&mut self, channel: u8) -> Result<f64> {
        self.refresh(channel)?;
        Ok(self.runtime[usize::from(channel)].last_position_um)
    }

    /// Current position in raw encoder counts (reads the device).
    pub fn position_encoder_counts(&mut self, channel: u8) -> Result<i32> {
        self.refresh(channel)
    }

    /// Symmetric travel window `(-limit, +limit)`; no I/O.
    pub fn position_limits_um(&self, channel: u8) -> Result<(f64, f64)> {
        let limit = self
            .channels
            .get(usize::from(channel))
            .and_then(|c| c.stage)
            .map(|s| s.limit_um())
            .ok_or_else(|| eyre::Report::new(StageError::ChannelNotConfigured(channel)))?;
        Ok((-limit, limit))
    }

    /// Turn a request into an absolute target, check it against the limits and
    /// snap it to whole counts. Relative requests read the encoder first.
    fn legalize(&mut self, channel: u8, amount_um: f64, relative: bool) -> Result<(i32, f64)> {
        let conv = self.converter(channel)?;
        let (_, limit) = self.position_limits_um(channel)?;
        debug!(device = %self.name, channel, amount_um, relative, "requested move");
        let requested_um = if relative {
            // The stage may have been jogged by hand since the last read.
            self.refresh(channel)?;
            amount_um + self.runtime[usize::from(channel)].last_position_um
        } else {
            amount_um
        };
        if !(-limit..=limit).contains(&requested_um) {
            return Err(eyre::Report::new(StageError::LimitExceeded {
                channel,
                requested_um,
                limit_um: limit,
            }));
        }
        let (mut counts, mut legal_um) = conv.legalize(requested_um);
        if legal_um.abs() > limit {
            // Rounded past the edge; the neighbour toward zero is in range.
            counts -= counts.signum();
            legal_um = conv.to_position_um(counts);
        }
        debug!(device = %self.name, channel, requested_um, legal_um, counts, "legal move");
        Ok((counts, legal_um))
    }

    /// Wait for the in-flight move on `channel` to arrive or for `timeout` to
    /// pass. The target is cleared in both cases. The encoder is read at least
    /// once, so a zero timeout still reports a stage already on target.
    ///
    /// A transport or protocol error aborts the wait and leaves the target
    /// in place.
    pub fn finish_move(&mut self, channel: u8, timeout: Duration) -> Result<MoveOutcome> {
        self.converter(channel)?;
        let idx = usize::from(channel);
        let Some(target) = self.runtime[idx].target_encoder_counts else {
            return Ok(MoveOutcome::Idle);
        };
        let tolerance = self.motion.tolerance_counts.max(1);
        let mut last = self.runtime[idx].last_encoder_counts;
        let start = self.clock.now();
        loop {
            last = self.refresh(channel)?;
            let remaining = target.abs_diff(last);
            trace!(device = %self.name, channel, remaining, tolerance, "counts from target");
            if remaining <= tolerance {
                self.runtime[idx].target_encoder_counts = None;
                info!(device = %self.name, channel, counts = last, "finished move");
                return Ok(MoveOutcome::Arrived { counts: last });
            }
            self.clock.sleep(self.motion.poll_interval);
            if self.clock.elapsed_since(start) >= timeout {
                break;
            }
        }
        self.runtime[idx].target_encoder_counts = None;
        warn!(
            device = %self.name,
            channel,
            remaining = target.abs_diff(last),
            ?timeout,
            "move timed out"
        );
        Ok(MoveOutcome::TimedOut {
            target_counts: target,
            last_counts: last,
        })
    }

    /// Move a channel and return the position actually commanded.
    ///
    /// `amount_um` is absolute, or a delta from the freshly read position when
    /// `relative` is set. Any move still in flight on the channel is resolved
    /// first (bounded by `MotionCfg::drain_timeout`). With `timeout` set the
    /// call waits for arrival and fails with `MoveTimedOut` if it does not
    /// come; without it the move stays in flight.
    pub fn move_um(
        &mut self,
        channel: u8,
        amount_um: f64,
        relative: bool,
        timeout: Option<Duration>,
    ) -> Result<f64> {
        let (counts, legal_um) = self.legalize(channel, amount_um, relative)?;
        let idx = usize::from(channel);

        if self.runtime[idx].in_flight() {
            let drain = self.motion.drain_timeout;
            if let MoveOutcome::TimedOut {
                target_counts,
                last_counts,
            } = self.finish_move(channel, drain)?
            {
                warn!(
                    device = %self.name,
                    channel,
                    target_counts,
                    last_counts,
                    "abandoned pending move before issuing a new one"
                );
            }
        }

        info!(device = %self.name, channel, um = legal_um, counts, "moving");
        self.runtime[idx].target_encoder_counts = Some(counts);
        if let Err(e) = self.exchange(Command::MoveAbsolute { channel, counts }) {
            self.runtime[idx].target_encoder_counts = None;
            return Err(e);
        }

        if let Some(timeout) = timeout {
            if let MoveOutcome::TimedOut {
                target_counts,
                last_counts,
            } = self.finish_move(channel, timeout)?
            {
                return Err(eyre::Report::new(StageError::MoveTimedOut {
                    channel,
                    target_counts,
                    last_counts,
                }));
            }
        }
        Ok(legal_um)
    }

    /// Reset the channel's encoder to zero at its current physical position
    /// and wait until the device reports exactly zero.
    ///
    /// The wait has no deadline: a device that never reports zero blocks the
    /// caller indefinitely. Any move in flight is dropped, since its target
    /// was expressed in the old reference.
    pub fn zero_encoder(&mut self, channel: u8) -> Result<()> {
        self.converter(channel)?;
        let idx = usize::from(channel);
        info!(device = %self.name, channel, "setting encoder counts to zero");
        if let Some(target) = self.runtime[idx].target_encoder_counts.take() {
            debug!(device = %self.name, channel, target, "dropping in-flight target");
        }
        self.exchange(Command::SetZero { channel })?;
        let mut polls: u64 = 0;
        while self.refresh(channel)? != 0 {
            polls += 1;
            if polls % ZERO_WAIT_WARN_EVERY == 0 {
                warn!(device = %self.name, channel, polls, "still waiting for encoder zero");
            }
            self.clock.sleep(self.motion.poll_interval);
        }
        info!(device = %self.name, channel, "encoder zeroed");
        Ok(())
    }

    /// Release the link. Runtime state is discarded with the controller.
    pub fn close(mut self) -> Result<()> {
        info!(device = %self.name, "closing");
        self.transport
            .close()
            .map_err(|e| eyre::Report::new(map_transport_error(0, &*e)))?;
        Ok(())
    }
}
