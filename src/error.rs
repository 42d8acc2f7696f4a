//! Errors returned by the ranging API

use thiserror::Error;

/// An error returned from the explicit ranging API
///
/// The event hooks of [`DsTwr`] never return this. Failures there are reported
/// through the statistics counters and the transmit-error listeners.
///
/// [`DsTwr`]: crate::DsTwr
#[derive(Debug, Error)]
pub enum Error<E> {
    /// An exchange is already in progress on this session
    #[error("an exchange is already in progress")]
    Busy,

    /// The radio driver refused to start a transmission or reception
    #[error("radio error: {0:?}")]
    Radio(E),

    /// A frame could not be encoded or decoded
    #[error("frame error: {0}")]
    Frame(FrameError),
}

impl<E> From<FrameError> for Error<E> {
    fn from(error: FrameError) -> Self {
        Error::Frame(error)
    }
}

/// A frame was malformed
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum FrameError {
    /// The frame length doesn't match its layout
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Length of the expected layout
        expected: usize,
        /// Length of the received frame
        actual: usize,
    },

    /// The message code is not a double-sided ranging code
    #[error("unknown message code {0:#04x}")]
    UnknownCode(u8),

    /// The codec rejected the frame
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}

impl From<byte::Error> for FrameError {
    fn from(error: byte::Error) -> Self {
        match error {
            byte::Error::Incomplete => FrameError::Malformed("incomplete"),
            byte::Error::BadOffset(_) => FrameError::Malformed("bad offset"),
            byte::Error::BadInput { err } => FrameError::Malformed(err),
        }
    }
}
