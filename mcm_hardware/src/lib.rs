pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;

#[cfg(feature = "hardware")]
pub use serial::SerialTransport;

use std::collections::VecDeque;

use mcm_traits::Transport;
use mcm_traits::protocol::*;
use tracing::trace;

use crate::error::HwError;

#[derive(Debug, Clone, Copy, Default)]
struct SimChannel {
    counts: i32,
    goal: i32,
    stalled: bool,
    /// Reads left before a pending counter reset lands.
    reset_in: Option<u32>,
    reset_value: i32,
}

/// Simulated three-channel stage controller speaking the binary wire protocol.
///
/// Requests are decoded device-side. A move sets a goal that the encoder
/// approaches by `step_per_read` counts on every read of that channel (or
/// reaches at once when no step is set). Counter resets land after
/// `reset_latency_reads` reads.
#[derive(Debug, Default)]
pub struct SimulatedMcm3000 {
    channels: [SimChannel; CHANNEL_COUNT],
    outbox: VecDeque<u8>,
    step_per_read: Option<u32>,
    reset_latency_reads: u32,
    frames_received: usize,
}

impl SimulatedMcm3000 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move at most `step` counts per read instead of jumping to the goal.
    pub fn with_step_per_read(mut self, step: u32) -> Self {
        self.step_per_read = Some(step.max(1));
        self
    }

    /// Delay counter resets by `reads` reads of the affected channel.
    pub fn with_reset_latency(mut self, reads: u32) -> Self {
        self.reset_latency_reads = reads;
        self
    }

    /// Seed a channel's encoder, as if it had been jogged there by hand.
    pub fn with_counts(mut self, channel: usize, counts: i32) -> Self {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.counts = counts;
            ch.goal = counts;
        }
        self
    }

    /// Freeze a channel: it accepts moves but its encoder never changes.
    pub fn with_stalled_channel(mut self, channel: usize) -> Self {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.stalled = true;
        }
        self
    }

    /// Current encoder count of a channel.
    pub fn counts(&self, channel: usize) -> Option<i32> {
        self.channels.get(channel).map(|c| c.counts)
    }

    /// Number of request frames decoded so far.
    pub fn frames_received(&self) -> usize {
        self.frames_received
    }

    fn channel_mut(&mut self, raw: usize) -> Result<&mut SimChannel, HwError> {
        self.channels
            .get_mut(raw)
            .ok_or_else(|| HwError::MalformedFrame(format!("channel {raw} out of range")))
    }

    fn advance(&mut self, channel: usize) -> Result<i32, HwError> {
        let step = self.step_per_read;
        let ch = self.channel_mut(channel)?;
        if let Some(left) = ch.reset_in {
            if left == 0 {
                ch.counts = ch.reset_value;
                ch.goal = ch.reset_value;
                ch.reset_in = None;
            } else {
                ch.reset_in = Some(left - 1);
            }
        }
        if !ch.stalled && ch.counts != ch.goal {
            let remaining = i64::from(ch.goal) - i64::from(ch.counts);
            let delta = match step {
                Some(s) => remaining.clamp(-i64::from(s), i64::from(s)),
                None => remaining,
            };
            ch.counts = (i64::from(ch.counts) + delta) as i32;
        }
        Ok(ch.counts)
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), HwError> {
        if frame.len() < READ_REQUEST_LEN || frame[1] != OP_HIGH {
            return Err(HwError::MalformedFrame(format!("bad header {frame:02X?}")));
        }
        match (frame[0], frame.len()) {
            (OP_READ_POSITION, READ_REQUEST_LEN) => {
                let channel = frame[2];
                let counts = self.advance(usize::from(channel))?;
                let mut resp = [0u8; POSITION_RESPONSE_LEN];
                resp[0] = OP_POSITION_REPORT;
                resp[1] = OP_HIGH;
                resp[2] = PAYLOAD_LEN_MARKER;
                resp[4] = 0x81;
                resp[5] = 0x50;
                resp[RESPONSE_CHANNEL_OFFSET] = channel;
                resp[RESPONSE_COUNTS_OFFSET..].copy_from_slice(&counts.to_le_bytes());
                trace!(channel, counts, "sim: position report");
                self.outbox.extend(resp);
                Ok(())
            }
            (op @ (OP_MOVE_ABSOLUTE | OP_SET_COUNTER), LONG_REQUEST_LEN) => {
                let channel = u16::from_le_bytes([
                    frame[REQUEST_CHANNEL_OFFSET],
                    frame[REQUEST_CHANNEL_OFFSET + 1],
                ]);
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&frame[REQUEST_COUNTS_OFFSET..LONG_REQUEST_LEN]);
                let value = i32::from_le_bytes(raw);
                let latency = self.reset_latency_reads;
                let ch = self.channel_mut(usize::from(channel))?;
                if op == OP_MOVE_ABSOLUTE {
                    trace!(channel, goal = value, "sim: move absolute");
                    ch.goal = value;
                } else {
                    trace!(channel, value, "sim: set counter");
                    ch.reset_value = value;
                    ch.reset_in = Some(latency);
                }
                Ok(())
            }
            (op, len) => Err(HwError::MalformedFrame(format!(
                "unexpected opcode 0x{op:02X} with length {len}"
            ))),
        }
    }
}

impl Transport for SimulatedMcm3000 {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.frames_received += 1;
        self.handle_frame(bytes)?;
        Ok(())
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.outbox.len() < buf.len() {
            // A real port would block until its read timeout and come back short.
            self.outbox.clear();
            return Err(Box::new(HwError::Timeout));
        }
        for slot in buf.iter_mut() {
            *slot = self.outbox.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn bytes_pending(&mut self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.outbox.len())
    }
}
