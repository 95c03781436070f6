//! Error type for decoding and encoding Teapotnet wire objects.

use teapotnet_error::{ErrorKind, HasKind};

/// Error produced while reading a [`crate::Reader`] or writing a
/// [`crate::Writer`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The reader ran out of bytes before a field could be fully
    /// extracted.
    #[error("truncated: needed {needed} more byte(s), had {available}")]
    Truncated {
        /// Bytes still needed to complete the read.
        needed: usize,
        /// Bytes actually remaining in the reader.
        available: usize,
    },
    /// [`crate::Reader::finish`] was called but bytes remained.
    #[error("{0} extra byte(s) at end of frame")]
    ExtraneousBytes(usize),
    /// A length prefix described a payload larger than this codec
    /// allows (64 KiB for 16-bit length fields, 4 GiB for 32-bit
    /// ones).
    #[error("length prefix {0} exceeds the maximum for this field")]
    BadLengthValue(u64),
    /// The bytes did not describe a valid value for the target type
    /// (for example, a digest of the wrong width).
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Protocol
    }
}

/// Convenience alias for results produced by this crate's codec.
pub type Result<T> = std::result::Result<T, Error>;
