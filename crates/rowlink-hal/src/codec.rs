//! Frame codec contract.
//!
//! The byte-level CSAFE tables live outside this workspace; the session only
//! needs to turn a command list into a frame and a frame back into a
//! [`ResponseMap`].

use rowlink_types::{CsafeCommand, ResponseMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("cannot encode: {0}")]
    Encode(String),

    #[error("frame too short")]
    ShortFrame,

    #[error("corrupt frame: {0}")]
    Corrupt(String),
}

/// Stateless encoder/decoder shared by every session.
pub trait FrameCodec: Send + Sync {
    /// # Errors
    ///
    /// [`CodecError::Encode`] when a command is unknown or carries the wrong
    /// number of arguments.
    fn encode(&self, commands: &[CsafeCommand]) -> Result<Vec<u8>, CodecError>;

    /// # Errors
    ///
    /// [`CodecError::ShortFrame`] or [`CodecError::Corrupt`] when the frame
    /// cannot be parsed.
    fn decode(&self, frame: &[u8]) -> Result<ResponseMap, CodecError>;
}
