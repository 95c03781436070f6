//! The three credential modes a secure channel can negotiate
//! (`spec.md` §4.2), expressed as a tagged-variant enum dispatching to
//! capability trait objects rather than the original implementation's
//! `Credentials` class hierarchy (`spec.md` §9 redesign note).

use std::sync::Arc;

use teapotnet_identity::{Identifier, NodeCertificate, NodeKeyPair};

/// Looks up the pre-shared key registered for a peering name.
///
/// Held by the server side of a pre-shared-key handshake; the
/// application supplies the mapping (contacts' shared secrets, for
/// example), the channel only consumes it.
pub trait PskLookup: Send + Sync {
    /// Returns the key bytes for `peering_name`, or `None` if no key
    /// is registered and the handshake should fail with
    /// [`crate::ChannelError::AuthFailed`].
    fn lookup(&self, peering_name: &Identifier) -> Option<Vec<u8>>;
}

/// Authorizes a peer's certificate-mode identity.
///
/// The channel only checks that the certificate's Subject CN matches
/// its own embedded public key (internal consistency); authorization
/// — whether *this* identity is one we are willing to talk to — is
/// delegated to the application via this trait, the way
/// `tpn::SecureTransport`'s verifier callback worked.
pub trait CertVerifier: Send + Sync {
    /// Returns `true` if `identity` is authorized to establish a
    /// channel with us.
    fn authorize(&self, identity: &Identifier) -> bool;
}

/// Credentials presented by the local side of a handshake.
#[derive(Clone)]
pub enum LocalCredentials {
    /// No identity; used only for initial address discovery
    /// (`spec.md` §4.2).
    Anonymous,
    /// A shared secret keyed by a public peering name.
    PreSharedKey {
        /// The peering name advertised to the remote side.
        peering_name: Identifier,
        /// The shared secret itself.
        key: Vec<u8>,
    },
    /// A self-signed certificate over an RSA keypair.
    Certificate {
        /// The node's keypair, used to sign the handshake transcript.
        keypair: Arc<NodeKeyPair>,
        /// The node's self-signed certificate, sent to the peer.
        certificate: NodeCertificate,
    },
}

/// How the remote side of a handshake is to be authenticated.
#[derive(Clone)]
pub enum RemoteVerifier {
    /// Accept any anonymous peer (initial discovery only).
    Anonymous,
    /// Look up the expected key via a [`PskLookup`].
    PreSharedKey(Arc<dyn PskLookup>),
    /// Authorize the peer's certificate via a [`CertVerifier`].
    Certificate(Arc<dyn CertVerifier>),
}

/// The credential mode actually negotiated by a completed handshake,
/// reported to the overlay so it can apply `spec.md` §4.2's rule about
/// anonymous links ("the overlay refuses links whose mode is
/// Anonymous and whose advertised identifier is not >= the peer's").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatedMode {
    /// No verified identity. `claimed` is an unverified, self-declared
    /// identifier derived from the peer's ephemeral key, present only
    /// so the overlay's deterministic tie-break has something to
    /// compare; it carries no authentication weight.
    Anonymous {
        /// Unverified identifier hint.
        claimed: Identifier,
    },
    /// A shared secret authenticated the peer by its peering name.
    PreSharedKey(Identifier),
    /// A certificate authenticated the peer by its identity digest.
    Certificate(Identifier),
}

impl NegotiatedMode {
    /// The identifier this mode reports, verified or not.
    pub fn identifier(&self) -> Identifier {
        match self {
            NegotiatedMode::Anonymous { claimed } => *claimed,
            NegotiatedMode::PreSharedKey(id) => *id,
            NegotiatedMode::Certificate(id) => *id,
        }
    }

    /// `true` if the reported identifier was cryptographically
    /// verified (pre-shared key or certificate mode).
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, NegotiatedMode::Anonymous { .. })
    }
}
