pub mod clock;
pub mod protocol;

pub use clock::{Clock, MonotonicClock};

/// Byte-oriented duplex link to the stage controller.
///
/// Implementations block on `read_exact` until the buffer is filled or their
/// own read timeout elapses; a short read is an error.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn read_exact(&mut self, buf: &mut [u8])
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Number of received bytes not yet consumed.
    fn bytes_pending(&mut self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_all(bytes)
    }
    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_exact(buf)
    }
    fn bytes_pending(&mut self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        (**self).bytes_pending()
    }
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).close()
    }
}
