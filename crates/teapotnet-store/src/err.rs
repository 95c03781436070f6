//! Error type for the block store, fountain codec, and retrieval
//! scheduler.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors this crate can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// A block's content did not hash to the digest it was staged
    /// under.
    #[error("staged block does not match its expected digest")]
    HashMismatch,
    /// No local record and no reachable source for a digest.
    #[error("block not found")]
    NotFound,
    /// A wait for a block or a fully-decoded target expired.
    #[error("timed out waiting for block")]
    Timeout,
    /// A Call, Data, or Cancel payload could not be decoded, or a
    /// Data message's leading component fell outside the requested
    /// range.
    #[error("malformed or out-of-range fountain message")]
    Protocol,
    /// The caller's interest in a digest was revoked before it
    /// resolved.
    #[error("retrieval cancelled")]
    Cancelled,
    /// Underlying filesystem error.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The overlay could not deliver a message.
    #[error("overlay error: {0}")]
    Overlay(#[from] teapotnet_overlay::OverlayError),
    /// The pub/sub engine could not be used.
    #[error("pub/sub error: {0}")]
    Pubsub(#[from] teapotnet_pubsub::PubsubError),
}

impl HasKind for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::HashMismatch => ErrorKind::Protocol,
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::Timeout => ErrorKind::Timeout,
            StoreError::Protocol => ErrorKind::Protocol,
            StoreError::Cancelled => ErrorKind::Cancelled,
            StoreError::Io(_) => ErrorKind::Unavailable,
            StoreError::Overlay(e) => e.kind(),
            StoreError::Pubsub(e) => e.kind(),
        }
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, StoreError>;
