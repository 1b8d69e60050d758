use std::io::{Read, Write};
use std::time::Duration;

use mcm_traits::Transport;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

/// Serial link to a physical controller (8N1, no flow control).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Line rate the controller ships with.
    pub const DEFAULT_BAUD: u32 = 460_800;

    /// Open `name`; `read_timeout` bounds every blocking read.
    pub fn open(name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| HwError::Open {
                port: name.to_string(),
                reason: e.to_string(),
            })?;
        debug!(port = name, baud_rate, "serial port opened");
        Ok(Self {
            port,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .finish()
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        trace!(port = %self.name, frame = ?bytes, "tx");
        self.port.write_all(bytes).map_err(HwError::Io)?;
        self.port.flush().map_err(HwError::Io)?;
        Ok(())
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.port.read_exact(buf) {
            Ok(()) => {
                trace!(port = %self.name, frame = ?buf, "rx");
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof
                ) =>
            {
                Err(Box::new(HwError::Timeout))
            }
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn bytes_pending(&mut self) -> std::result::Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let n = self
            .port
            .bytes_to_read()
            .map_err(|e| HwError::Serial(e.to_string()))?;
        Ok(n as usize)
    }

    fn close(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.port
            .clear(ClearBuffer::All)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        debug!(port = %self.name, "serial port closed");
        Ok(())
    }
}
