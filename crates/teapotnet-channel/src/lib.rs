//! Mutually-authenticated secure channel: the handshake and AEAD
//! record layer described in `spec.md` §4.2 ("C2 — Secure channel").
//!
//! A channel starts from one of three credential modes
//! ([`LocalCredentials`]) — anonymous Diffie-Hellman, a pre-shared key
//! keyed by a peering name, or a self-signed certificate — and ends, on
//! success, with a [`SecureChannel`] carrying AEAD-protected messages
//! and reporting the [`NegotiatedMode`] the overlay uses to key its
//! routing table.

mod channel;
mod credential;
mod err;
mod handshake;
mod record;

pub use channel::{
    RecordTransport, SecureChannel, StreamTransport, DEFAULT_HANDSHAKE_TIMEOUT,
};
pub use credential::{CertVerifier, LocalCredentials, NegotiatedMode, PskLookup, RemoteVerifier};
pub use err::{ChannelError, Result};
pub use handshake::{run_handshake, MessageTransport, Role};
pub use record::{RecordCipher, RecordKeys, MAX_DATAGRAM_RECORD};
