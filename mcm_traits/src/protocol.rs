//! Wire vocabulary shared by the host-side codec and the simulated device.
//!
//! All multi-byte fields are little-endian. Channel indices are zero-based.

/// Number of channels on the controller.
pub const CHANNEL_COUNT: usize = 3;

/// Opcode (low byte) of the read-encoder request.
pub const OP_READ_POSITION: u8 = 0x0A;
/// Opcode (low byte) of the move-to-absolute-count request.
pub const OP_MOVE_ABSOLUTE: u8 = 0x53;
/// Opcode (low byte) of the set-encoder-counter request.
pub const OP_SET_COUNTER: u8 = 0x09;
/// High byte shared by every opcode.
pub const OP_HIGH: u8 = 0x04;
/// Payload length marker carried by the 12-byte requests.
pub const PAYLOAD_LEN_MARKER: u8 = 0x06;

/// Length of the read-encoder request.
pub const READ_REQUEST_LEN: usize = 6;
/// Length of move-absolute and set-counter requests.
pub const LONG_REQUEST_LEN: usize = 12;
/// Length of the read-encoder response.
pub const POSITION_RESPONSE_LEN: usize = 12;
/// Offset of the echoed channel byte inside the position response.
pub const RESPONSE_CHANNEL_OFFSET: usize = 6;
/// Offset of the signed 32-bit count inside the position response.
pub const RESPONSE_COUNTS_OFFSET: usize = 8;
/// Offset of the u16 channel inside the 12-byte requests.
pub const REQUEST_CHANNEL_OFFSET: usize = 6;
/// Offset of the i32 count inside the 12-byte requests.
pub const REQUEST_COUNTS_OFFSET: usize = 8;
/// Opcode (low byte) of the encoder report sent back for a read request.
pub const OP_POSITION_REPORT: u8 = 0x0B;
