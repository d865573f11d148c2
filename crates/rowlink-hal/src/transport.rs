//! Raw frame I/O on one claimed device.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint timed out or is held elsewhere.
    #[error("device busy")]
    Busy,

    /// The device is gone from the bus.
    #[error("device disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(String),
}

/// An open device endpoint.  Owned by exactly one session.
#[async_trait]
pub trait ErgTransport: Send {
    /// Write one request frame, returning the number of bytes accepted.
    async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError>;

    /// Read at most `max_len` bytes of the response frame.  An empty vector
    /// means nothing has arrived yet.
    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;
}
