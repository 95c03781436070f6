//! Identifiers, network addresses, and node key material shared by
//! every component of the Teapotnet core engine (`spec.md` §3).

mod address;
mod identifier;
mod keypair;

pub use address::Address;
pub use identifier::{FromHexError, Identifier};
pub use keypair::{KeyError, NodeCertificate, NodeKeyPair, KEY_BITS};
