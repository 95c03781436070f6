//! Error type for the tunneler.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors a tunnel operation can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TunnelError {
    /// No tunnel with the given id exists locally.
    #[error("no such tunnel")]
    NotFound,
    /// The first inbound payload for an unknown id carried no valid
    /// cookie, or the cookie round trip never completed.
    #[error("tunnel cookie rejected")]
    AuthFailed,
    /// A read blocked past its deadline.
    #[error("tunnel read timed out")]
    Timeout,
    /// The underlying overlay send failed.
    #[error("overlay error: {0}")]
    Overlay(#[from] teapotnet_overlay::OverlayError),
    /// The secure channel over this tunnel failed.
    #[error("channel error: {0}")]
    Channel(#[from] teapotnet_channel::ChannelError),
    /// The tunnel's inbound side was closed.
    #[error("tunnel closed")]
    Closed,
}

impl HasKind for TunnelError {
    fn kind(&self) -> ErrorKind {
        match self {
            TunnelError::NotFound => ErrorKind::NotFound,
            TunnelError::AuthFailed => ErrorKind::AuthFailed,
            TunnelError::Timeout => ErrorKind::Timeout,
            TunnelError::Overlay(e) => e.kind(),
            TunnelError::Channel(e) => e.kind(),
            TunnelError::Closed => ErrorKind::Unavailable,
        }
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, TunnelError>;
