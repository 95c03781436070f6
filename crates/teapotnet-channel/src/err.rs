//! Error type for the secure-channel handshake and record layer.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors the secure channel can raise, matching the contract in
/// `spec.md` §4.2.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    /// The peer's credentials were rejected by the verifier callback,
    /// or a signature/MAC check failed.
    #[error("authentication failed: {0}")]
    AuthFailed(&'static str),
    /// No handshake progress was made within the deadline
    /// (30 s by default, `spec.md` §4.2).
    #[error("handshake timed out")]
    Timeout,
    /// A record or handshake message was malformed.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// The underlying carrier failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl HasKind for ChannelError {
    fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::AuthFailed(_) => ErrorKind::AuthFailed,
            ChannelError::Timeout => ErrorKind::Timeout,
            ChannelError::Protocol(_) => ErrorKind::Protocol,
            ChannelError::Io(_) => ErrorKind::NetworkUnreachable,
        }
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, ChannelError>;
