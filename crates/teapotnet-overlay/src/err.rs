//! Error type for the overlay router.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors the overlay router can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum OverlayError {
    /// No link and no route exist toward a destination.
    #[error("no route to destination")]
    NoRoute,
    /// The handshake or link setup failed authentication.
    #[error("link authentication failed: {0}")]
    AuthFailed(&'static str),
    /// A frame or tracker response was malformed.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// A bootstrap or handshake step timed out.
    #[error("overlay operation timed out")]
    Timeout,
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The secure channel reported an error establishing a link.
    #[error("channel error: {0}")]
    Channel(#[from] teapotnet_channel::ChannelError),
}

impl HasKind for OverlayError {
    fn kind(&self) -> ErrorKind {
        match self {
            OverlayError::NoRoute => ErrorKind::NetworkUnreachable,
            OverlayError::AuthFailed(_) => ErrorKind::AuthFailed,
            OverlayError::Protocol(_) => ErrorKind::Protocol,
            OverlayError::Timeout => ErrorKind::Timeout,
            OverlayError::Io(_) => ErrorKind::NetworkUnreachable,
            OverlayError::Channel(e) => e.kind(),
        }
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, OverlayError>;
