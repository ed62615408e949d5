//! Error types for chatrelay

use thiserror::Error;

/// Result type alias for chatrelay core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding an inbound frame.
///
/// Every variant ends the connection that produced it.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The underlying stream failed or closed mid-frame
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The length prefix was zero or did not parse as a decimal number
    #[error("invalid frame length {prefix:?}")]
    InvalidLength { prefix: String },

    /// The length prefix exceeded the configured maximum
    #[error("frame too large: {length} bytes (max {max})")]
    PayloadTooLarge { length: usize, max: usize },
}

impl FrameError {
    /// True when the peer simply went away rather than sending garbage
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FrameError::Io(_))
    }
}

/// chatrelay error types
#[derive(Error, Debug)]
pub enum Error {
    /// Frame decoding error
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Attempted to encode a frame with no payload
    #[error("payload is empty")]
    EmptyPayload,

    /// Attempted to encode a payload larger than the protocol allows
    #[error("payload too large: {0} bytes (max 65536)")]
    PayloadTooLarge(usize),
}
