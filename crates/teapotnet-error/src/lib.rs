//! Shared error classification for the Teapotnet core engine.
//!
//! Every crate in the workspace defines its own concrete error type
//! (usually a `thiserror`-derived enum) and implements [`HasKind`] for
//! it, mapping each variant onto one of the [`ErrorKind`]s defined
//! here. Callers that cross a component boundary (overlay -> tunnel,
//! tunnel -> pub/sub, pub/sub -> store) program against `ErrorKind`
//! rather than matching on a specific crate's error variants, so that
//! the recovery policy in the specification (retry, penalize, wait,
//! give up) can be implemented once, centrally, instead of once per
//! call site.

use std::fmt;

/// Classification of an error arising from the Teapotnet core engine.
///
/// Mirrors the seven kinds named by the specification's error-handling
/// design: each has a fixed recovery policy that callers should apply
/// regardless of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No link and no route exist to the destination.
    ///
    /// Recovery: retry with exponential backoff; an upper layer may
    /// also attempt to find a fresh route (a new tracker lookup, a new
    /// pub/sub round) before retrying.
    NetworkUnreachable,
    /// A secure-channel handshake or a signature check was rejected.
    ///
    /// Recovery: never retried on the same link. The link should be
    /// penalized (see `teapotnet-overlay`'s link penalty backoff).
    AuthFailed,
    /// A malformed frame, an invalid fountain combination, or an
    /// oversize payload was received.
    ///
    /// Recovery: never retried on the same link; the link is
    /// penalized.
    Protocol,
    /// A deadline expired while waiting for a blocking operation.
    ///
    /// Recovery: retried by upper layers with exponential backoff.
    Timeout,
    /// The requested resource exists in principle but is not yet
    /// present (a block still downloading, a digest not yet
    /// discovered).
    ///
    /// Recovery: waitable; the caller should register a waiter rather
    /// than poll.
    Unavailable,
    /// The requested resource is permanently absent: no source, no
    /// local record.
    ///
    /// Recovery: terminal for the operation.
    NotFound,
    /// The caller revoked interest before the operation completed.
    ///
    /// Recovery: terminal for the operation; not an error condition
    /// worth logging above `debug`.
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if the recovery policy for this kind is "retry
    /// with exponential backoff by the upper layer".
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::NetworkUnreachable | ErrorKind::Timeout)
    }

    /// Returns `true` if receiving an error of this kind from a peer
    /// should increase that peer's link penalty.
    pub fn penalizes_link(self) -> bool {
        matches!(self, ErrorKind::AuthFailed | ErrorKind::Protocol)
    }

    /// Returns `true` if the operation can be resolved later purely by
    /// waiting (no retry of the request itself is needed).
    pub fn is_waitable(self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NetworkUnreachable => "network unreachable",
            ErrorKind::AuthFailed => "authentication failed",
            ErrorKind::Protocol => "protocol violation",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Unavailable => "temporarily unavailable",
            ErrorKind::NotFound => "not found",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Implemented by every concrete error type in the workspace so that
/// callers can classify an error without matching on its crate-local
/// variants.
pub trait HasKind {
    /// Returns the [`ErrorKind`] this error should be treated as.
    fn kind(&self) -> ErrorKind;
}

impl HasKind for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as IoKind;
        match self.kind() {
            IoKind::TimedOut => ErrorKind::Timeout,
            IoKind::NotFound => ErrorKind::NotFound,
            IoKind::ConnectionRefused
            | IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::NotConnected
            | IoKind::AddrNotAvailable
            | IoKind::BrokenPipe => ErrorKind::NetworkUnreachable,
            IoKind::InvalidData | IoKind::InvalidInput | IoKind::UnexpectedEof => {
                ErrorKind::Protocol
            }
            _ => ErrorKind::NetworkUnreachable,
        }
    }
}

/// An internal invariant violation: a bug in this codebase rather than
/// a condition an operator or peer could trigger honestly.
///
/// Used the way `tor_error::Bug` is used upstream: in lieu of `panic!`,
/// `unwrap()`, or `expect()` in non-test code, an invariant check that
/// fails produces a `Bug` that is propagated like any other error but
/// is always logged at `error` level and never retried.
#[derive(thiserror::Error, Debug, Clone)]
#[error("internal error: {0}")]
pub struct Bug(pub String);

impl HasKind for Bug {
    fn kind(&self) -> ErrorKind {
        // A bug is never a normal network condition; treat it the way
        // a permanently broken protocol state is treated.
        ErrorKind::Protocol
    }
}

/// Constructs a [`Bug`] tagged with the calling location, analogous to
/// `tor_error::internal!`.
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => {
        $crate::Bug(format!("{} ({}:{})", format_args!($($arg)*), file!(), line!()))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_matches_spec() {
        assert!(ErrorKind::NetworkUnreachable.is_retriable());
        assert!(ErrorKind::Timeout.is_retriable());
        assert!(!ErrorKind::Protocol.is_retriable());
        assert!(!ErrorKind::AuthFailed.is_retriable());
    }

    #[test]
    fn penalty_policy_matches_spec() {
        assert!(ErrorKind::AuthFailed.penalizes_link());
        assert!(ErrorKind::Protocol.penalizes_link());
        assert!(!ErrorKind::NetworkUnreachable.penalizes_link());
        assert!(!ErrorKind::Timeout.penalizes_link());
    }

    #[test]
    fn unavailable_is_waitable_not_found_is_not() {
        assert!(ErrorKind::Unavailable.is_waitable());
        assert!(!ErrorKind::NotFound.is_waitable());
    }

    #[test]
    fn internal_macro_produces_bug() {
        let bug: Bug = internal!("bad state: {}", 42);
        assert!(bug.0.contains("bad state: 42"));
        assert_eq!(bug.kind(), ErrorKind::Protocol);
    }
}
