//! Test and helper transports for mcm_core.

use std::collections::VecDeque;

use mcm_traits::Transport;
use mcm_traits::protocol::*;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Transport that records every frame written and answers through a
/// user-supplied responder. Whatever the responder returns is queued as
/// incoming bytes, so returning extra bytes simulates a desynchronized link.
pub struct ScriptedTransport {
    writes: Vec<Vec<u8>>,
    inbox: VecDeque<u8>,
    responder: Responder,
}

impl ScriptedTransport {
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            writes: Vec::new(),
            inbox: VecDeque::new(),
            responder: Box::new(responder),
        }
    }

    /// Answer every read request with the next value of `counts`, echoing the
    /// requested channel. The last value repeats once the script runs out.
    /// Move and zero requests get no reply.
    pub fn reporting(counts: impl IntoIterator<Item = i32>) -> Self {
        let mut script: VecDeque<i32> = counts.into_iter().collect();
        let mut last = script.front().copied().unwrap_or_default();
        Self::new(move |frame| {
            if frame.first() != Some(&OP_READ_POSITION) {
                return Vec::new();
            }
            if let Some(next) = script.pop_front() {
                last = next;
            }
            position_report(frame.get(2).copied().unwrap_or_default(), last)
        })
    }

    /// Every frame written so far, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// `(channel, counts)` of every move-absolute frame written so far.
    pub fn moves(&self) -> Vec<(u16, i32)> {
        self.writes
            .iter()
            .filter(|f| f.len() == LONG_REQUEST_LEN && f[0] == OP_MOVE_ABSOLUTE)
            .map(|f| {
                let ch = u16::from_le_bytes([f[6], f[7]]);
                let counts = i32::from_le_bytes([f[8], f[9], f[10], f[11]]);
                (ch, counts)
            })
            .collect()
    }
}

/// A well-formed 12-byte position report for `channel`.
pub fn position_report(channel: u8, counts: i32) -> Vec<u8> {
    let mut resp = vec![0u8; POSITION_RESPONSE_LEN];
    resp[0] = OP_POSITION_REPORT;
    resp[1] = OP_HIGH;
    resp[2] = PAYLOAD_LEN_MARKER;
    resp[RESPONSE_CHANNEL_OFFSET] = channel;
    resp[RESPONSE_COUNTS_OFFSET..].copy_from_slice(&counts.to_le_bytes());
    resp
}

impl Transport for ScriptedTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.writes.push(bytes.to_vec());
        let reply = (self.responder)(bytes);
        self.inbox.extend(reply);
        Ok(())
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let want = buf.len();
        if self.inbox.len() < want {
            let got = self.inbox.len();
            self.inbox.clear();
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("read timed out after {got} of {want} bytes"),
            )));
        }
        for (slot, byte) in buf.iter_mut().zip(self.inbox.drain(..want)) {
            *slot = byte;
        }
        Ok(())
    }

    fn bytes_pending(&mut self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inbox.len())
    }
}
