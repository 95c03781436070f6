//! Error type for the pub/sub engine.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors the pub/sub engine can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum PubsubError {
    /// A Subscribe, Publish, or Call payload could not be decoded.
    #[error("malformed pub/sub message")]
    Protocol,
    /// The overlay could not deliver a message.
    #[error("overlay error: {0}")]
    Overlay(#[from] teapotnet_overlay::OverlayError),
}

impl HasKind for PubsubError {
    fn kind(&self) -> ErrorKind {
        match self {
            PubsubError::Protocol => ErrorKind::Protocol,
            PubsubError::Overlay(e) => e.kind(),
        }
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, PubsubError>;
