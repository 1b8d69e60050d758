//! Request encoding and response decoding for the binary wire protocol.
//!
//! | Request        | Layout                                               | Reply    |
//! |----------------|------------------------------------------------------|----------|
//! | read position  | `0A 04 <ch:u8> 00 00 00`                             | 12 bytes |
//! | move absolute  | `53 04 06 00 00 00 <ch:u16 LE> <counts:i32 LE>`      | none     |
//! | set zero       | `09 04 06 00 00 00 <ch:u16 LE> <0:i32 LE>`           | none     |
//!
//! The position reply carries the echoed channel at byte 6 and the signed
//! count at bytes 8..12.

use mcm_traits::protocol::*;

use crate::error::Desync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadPosition { channel: u8 },
    MoveAbsolute { channel: u8, counts: i32 },
    SetZero { channel: u8 },
}

impl Command {
    pub fn channel(&self) -> u8 {
        match *self {
            Command::ReadPosition { channel }
            | Command::MoveAbsolute { channel, .. }
            | Command::SetZero { channel } => channel,
        }
    }

    /// Bytes the device sends back for this request, if it replies at all.
    pub fn response_len(&self) -> Option<usize> {
        match self {
            Command::ReadPosition { .. } => Some(POSITION_RESPONSE_LEN),
            Command::MoveAbsolute { .. } | Command::SetZero { .. } => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Command::ReadPosition { channel } => {
                vec![OP_READ_POSITION, OP_HIGH, channel, 0x00, 0x00, 0x00]
            }
            Command::MoveAbsolute { channel, counts } => {
                long_frame(OP_MOVE_ABSOLUTE, channel, counts)
            }
            Command::SetZero { channel } => long_frame(OP_SET_COUNTER, channel, 0),
        }
    }
}

fn long_frame(op: u8, channel: u8, value: i32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LONG_REQUEST_LEN);
    frame.extend_from_slice(&[op, OP_HIGH, PAYLOAD_LEN_MARKER, 0x00, 0x00, 0x00]);
    frame.extend_from_slice(&u16::from(channel).to_le_bytes());
    frame.extend_from_slice(&value.to_le_bytes());
    frame
}

/// Decode a position reply requested for `channel`.
pub fn decode_position(channel: u8, frame: &[u8]) -> Result<i32, Desync> {
    if frame.len() < POSITION_RESPONSE_LEN {
        return Err(Desync::ShortFrame(frame.len()));
    }
    let echoed = frame[RESPONSE_CHANNEL_OFFSET];
    if echoed != channel {
        return Err(Desync::ChannelMismatch { echoed });
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&frame[RESPONSE_COUNTS_OFFSET..RESPONSE_COUNTS_OFFSET + 4]);
    Ok(i32::from_le_bytes(raw))
}
