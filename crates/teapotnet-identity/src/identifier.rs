//! The 32-byte [`Identifier`] type named in `spec.md` §3: a digest
//! that names a node, an identity, a content block, or a path
//! fingerprint depending on context.

use std::fmt;
use teapotnet_bytes::{Digest32, Readable, Reader, Result as BytesResult, Writeable, Writer};

/// A 256-bit cryptographic digest naming a node, identity, block, or
/// path fingerprint.
///
/// Identifiers support total (lexicographic) order and XOR distance,
/// both required by the overlay's routing-table tie-break
/// (`spec.md` §4.3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identifier(Digest32);

impl Identifier {
    /// The all-zero identifier, used as a sentinel "no source" /
    /// "no destination" value the way `tpn::Identifier::Null` is used
    /// in the original implementation.
    pub const NULL: Identifier = Identifier([0u8; 32]);

    /// Wraps a raw 32-byte digest.
    pub const fn from_digest(digest: Digest32) -> Self {
        Identifier(digest)
    }

    /// Computes the identifier naming `bytes`: `SHA-256(bytes)`.
    ///
    /// Used both for node identities (hash of the public signing key)
    /// and for content blocks (hash of the block's bytes).
    pub fn hash(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&out);
        Identifier(digest)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &Digest32 {
        &self.0
    }

    /// Returns `true` if this is [`Identifier::NULL`].
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// XOR distance between two identifiers, used to rank candidate
    /// next hops in the overlay's freshness-weighted tie-break
    /// (`spec.md` §4.3).
    pub fn xor_distance(&self, other: &Identifier) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Renders the identifier as lowercase hex, as used for the node
    /// certificate Subject CN (`spec.md` §6) and the tracker URL path.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses an identifier from lowercase or uppercase hex.
    pub fn from_hex(s: &str) -> Result<Self, FromHexError> {
        let bytes = hex::decode(s).map_err(|_| FromHexError::NotHex)?;
        if bytes.len() != 32 {
            return Err(FromHexError::WrongLength(bytes.len()));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Identifier(digest))
    }
}

/// Error returned by [`Identifier::from_hex`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FromHexError {
    /// The input was not valid hex.
    #[error("not a valid hex string")]
    NotHex,
    /// The input decoded to the wrong number of bytes.
    #[error("expected 32 bytes, got {0}")]
    WrongLength(usize),
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}…)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Digest32> for Identifier {
    fn from(digest: Digest32) -> Self {
        Identifier(digest)
    }
}

impl From<Identifier> for Digest32 {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl Readable for Identifier {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let digest: Digest32 = r.extract()?;
        Ok(Identifier(digest))
    }
}

impl Writeable for Identifier {
    fn write_onto(&self, w: &mut Writer) {
        w.write(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Identifier::hash(b"hello world!");
        let b = Identifier::hash(b"hello world!");
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_lexicographic_on_bytes() {
        let a = Identifier::from_digest([1u8; 32]);
        let b = Identifier::from_digest([2u8; 32]);
        assert!(a < b);
    }

    #[test]
    fn xor_distance_to_self_is_zero() {
        let a = Identifier::hash(b"node-a");
        assert_eq!(a.xor_distance(&a), [0u8; 32]);
    }

    #[test]
    fn hex_round_trips() {
        let a = Identifier::hash(b"round trip me");
        let hex = a.to_hex();
        let back = Identifier::from_hex(&hex).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn wire_round_trips() {
        let a = Identifier::hash(b"wire");
        let mut w = Writer::new();
        w.write(&a);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: Identifier = r.extract().unwrap();
        assert_eq!(a, back);
    }
}
